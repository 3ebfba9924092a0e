use serde::Serialize;

/// Before/after view of a resource for dry-run and audit output.
///
/// `before` is `None` when the resource does not exist. `after` is always the
/// desired canonical state, whether or not anything is going to change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diff<T> {
    /// Canonical projection of the observed state.
    pub before: Option<T>,
    /// Canonical desired state.
    pub after: T,
}

impl<T: PartialEq> Diff<T> {
    /// Pair an observed projection with the desired state.
    pub fn new(before: Option<T>, after: T) -> Self {
        Self { before, after }
    }

    /// Whether the observed state already equals the desired one.
    pub fn converged(&self) -> bool {
        self.before.as_ref() == Some(&self.after)
    }
}
