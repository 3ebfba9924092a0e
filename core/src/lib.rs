#![deny(missing_docs)]
//! tn_core: reconciliation engine for cron jobs and custom applications,
//! plus the config, logging and backend plumbing around it.

/// Custom application parameters, desired spec and observed compose lookup.
pub mod app;
/// Backend capability traits and their implementations.
pub mod backend;
/// Configuration helpers (AppId, dirs, load_or_init, env overrides).
pub mod cfg;
/// Before/after diff reported for `present`.
pub mod diff;
/// Error kinds of a reconciliation.
pub mod error;
/// Cron job parameters, desired spec and observed-state extraction.
pub mod job;
/// Tracing/log initialization helpers.
pub mod logx;
/// Decision engine.
pub mod reconcile;
/// Opaque backend records.
pub mod record;
/// Cron schedule normalization.
pub mod schedule;
/// JSON state files with atomic writes.
pub mod store;

pub use error::{Error, ManifestError, Result};
pub use reconcile::{Action, Outcome, Reconciler, Target};
