//! Query-parameter validation with per-field failure details.
//!
//! Parameters arrive as raw strings so every violation produces a
//! pinpointed message in the error envelope's `details` map instead of
//! a framework-generic rejection.

use std::collections::BTreeMap;

use time::Date;
use wanimirror_core::{timestamp, SubjectKind};

use super::error::ApiFailure;

/// Accumulates per-field validation failures across a request's
/// parameters, so one response reports all of them.
pub(crate) struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub(crate) fn new() -> Self {
        Self {
            errors: BTreeMap::new(),
        }
    }

    pub(crate) fn subject_kind(
        &mut self,
        field: &str,
        value: Option<&str>,
    ) -> Option<SubjectKind> {
        let raw = value?;
        match SubjectKind::parse(raw) {
            Some(kind) => Some(kind),
            None => {
                self.fail(field, "must be one of radical, kanji, vocabulary");
                None
            }
        }
    }

    pub(crate) fn int_in_range(
        &mut self,
        field: &str,
        value: Option<&str>,
        min: i64,
        max: i64,
    ) -> Option<i64> {
        let raw = value?;
        match raw.parse::<i64>() {
            Ok(n) if (min..=max).contains(&n) => Some(n),
            _ => {
                self.fail(field, &format!("must be an integer in {min}..{max}"));
                None
            }
        }
    }

    pub(crate) fn date(&mut self, field: &str, value: Option<&str>) -> Option<Date> {
        let raw = value?;
        match timestamp::parse_date(raw) {
            Ok(date) => Some(date),
            Err(_) => {
                self.fail(field, "must be a date in YYYY-MM-DD form");
                None
            }
        }
    }

    /// When both bounds are present, `from` must not exceed `to`.
    pub(crate) fn ordered(&mut self, from: Option<Date>, to: Option<Date>) {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                self.fail("from", "must not be later than to");
            }
        }
    }

    pub(crate) fn finish(self) -> Result<(), ApiFailure> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiFailure::validation(self.errors))
        }
    }

    fn fail(&mut self, field: &str, message: &str) {
        self.errors.insert(field.to_string(), message.to_string());
    }
}
