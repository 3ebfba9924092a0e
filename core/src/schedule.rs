use serde::Serialize;
use serde_json::{Map, Value};

/// Field names of a cron schedule, in canonical order.
pub const FIELDS: [&str; 5] = ["minute", "hour", "dom", "month", "dow"];

/// Value used for any field that is not supplied.
pub const WILDCARD: &str = "*";

/// Canonical 5-field cron schedule.
///
/// Every field is a non-empty string. The contents are never interpreted as
/// cron syntax; validating them is up to the remote scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Schedule {
    minute: String,
    hour: String,
    dom: String,
    month: String,
    dow: String,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            minute: WILDCARD.to_owned(),
            hour: WILDCARD.to_owned(),
            dom: WILDCARD.to_owned(),
            month: WILDCARD.to_owned(),
            dow: WILDCARD.to_owned(),
        }
    }
}

impl Schedule {
    /// Normalize a sparse schedule.
    ///
    /// Anything that is not a mapping (including `None`) yields the
    /// all-wildcard schedule. Desired and observed schedules both go through
    /// here so that their defaults can never disagree.
    pub fn normalize(raw: Option<&Value>) -> Self {
        match raw {
            Some(Value::Object(fields)) => Self::from_mapping(fields),
            _ => Self::default(),
        }
    }

    /// Normalize a mapping of `{minute, hour, dom, month, dow}`; unknown keys
    /// are ignored.
    pub fn from_mapping(fields: &Map<String, Value>) -> Self {
        let field = |key: &str| normalize_field(fields.get(key));
        Self {
            minute: field("minute"),
            hour: field("hour"),
            dom: field("dom"),
            month: field("month"),
            dow: field("dow"),
        }
    }

    /// Minute field.
    pub fn minute(&self) -> &str {
        &self.minute
    }

    /// Hour field.
    pub fn hour(&self) -> &str {
        &self.hour
    }

    /// Day-of-month field.
    pub fn dom(&self) -> &str {
        &self.dom
    }

    /// Month field.
    pub fn month(&self) -> &str {
        &self.month
    }

    /// Day-of-week field.
    pub fn dow(&self) -> &str {
        &self.dow
    }

    /// `(name, value)` pairs in canonical order.
    pub fn fields(&self) -> [(&'static str, &str); 5] {
        [
            ("minute", self.minute.as_str()),
            ("hour", self.hour.as_str()),
            ("dom", self.dom.as_str()),
            ("month", self.month.as_str()),
            ("dow", self.dow.as_str()),
        ]
    }

    /// The schedule as a JSON mapping, in the shape the backend expects.
    pub fn to_mapping(&self) -> Map<String, Value> {
        self.fields()
            .into_iter()
            .map(|(k, v)| (k.to_owned(), Value::String(v.to_owned())))
            .collect()
    }
}

// Absent, null and empty become the wildcard; other scalars are stringified.
fn normalize_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => WILDCARD.to_owned(),
        Some(Value::String(s)) if s.is_empty() => WILDCARD.to_owned(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
