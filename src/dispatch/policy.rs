//! Acceptance rules applied to recognized documents.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use super::{Document, SkipReason};

/// Which documents a [`FileSender`](super::FileSender) is willing to sign and send.
///
/// Defaults accept formats `"4.0"` and `"3.1"` created less than one calendar
/// month before now.
///
/// # Examples
///
/// ```
/// use readthru::dispatch::DispatchPolicy;
///
/// let policy = DispatchPolicy::from_json(r#"{ "max_age_months": 3 }"#).unwrap();
/// assert!(policy.accepts_format("4.0"));
/// assert!(!policy.accepts_format("2.0"));
/// assert_eq!(policy.max_age_months, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchPolicy {
    /// Exact format strings that pass the format gate.
    pub accepted_formats: Vec<String>,
    /// Documents must be younger than this many calendar months.
    pub max_age_months: u32,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            accepted_formats: vec!["4.0".to_owned(), "3.1".to_owned()],
            max_age_months: 1,
        }
    }
}

impl DispatchPolicy {
    /// Creates the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a policy from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Adds a format to the accepted set.
    #[must_use]
    pub fn accept_format(mut self, format: impl Into<String>) -> Self {
        let format = format.into();
        if !self.accepted_formats.contains(&format) {
            self.accepted_formats.push(format);
        }
        self
    }

    /// Sets the maximum document age in calendar months.
    #[must_use]
    pub fn max_age_months(mut self, months: u32) -> Self {
        self.max_age_months = months;
        self
    }

    /// Returns `true` if `format` exactly matches an accepted format.
    pub fn accepts_format(&self, format: &str) -> bool {
        self.accepted_formats.iter().any(|f| f == format)
    }

    /// `created` plus the maximum age must still lie in the future.
    /// Documents dated after `now` are fresh.
    pub fn is_fresh(&self, created: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        created
            .checked_add_months(Months::new(self.max_age_months))
            .is_some_and(|expires| expires > now)
    }

    pub(super) fn check(&self, document: &Document, now: DateTime<Utc>) -> Result<(), SkipReason> {
        if !self.accepts_format(document.format()) {
            return Err(SkipReason::UnsupportedFormat {
                format: document.format().to_owned(),
            });
        }
        if !self.is_fresh(document.created(), now) {
            return Err(SkipReason::Stale {
                created: document.created(),
            });
        }
        Ok(())
    }
}
