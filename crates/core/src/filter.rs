use time::{Date, OffsetDateTime};

use crate::entity::{Assignment, Review, Subject, SubjectKind};

/// Filter for subject queries. Missing fields mean "unconstrained".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubjectFilter {
    /// Equality on the subject's kind.
    pub kind: Option<SubjectKind>,
    /// Equality on the payload's level placement.
    pub level: Option<i64>,
}

impl SubjectFilter {
    /// The model predicate the storage query must agree with.
    pub fn matches(&self, subject: &Subject) -> bool {
        self.kind.is_none_or(|k| subject.kind == k)
            && self.level.is_none_or(|l| subject.data.level == l)
    }
}

/// Filter for assignment queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignmentFilter {
    /// Equality on the SRS stage.
    pub srs_stage: Option<i64>,
}

impl AssignmentFilter {
    pub fn matches(&self, assignment: &Assignment) -> bool {
        self.srs_stage.is_none_or(|s| assignment.srs_stage == s)
    }
}

/// A timestamp range, inclusive at both ends at second precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<OffsetDateTime>,
    pub to: Option<OffsetDateTime>,
}

impl TimeRange {
    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        self.from.is_none_or(|f| ts >= f) && self.to.is_none_or(|t| ts <= t)
    }

    /// The model predicate for review queries: inclusive on `created_at`.
    pub fn matches(&self, review: &Review) -> bool {
        self.contains(review.created_at)
    }
}

/// A calendar-day range, inclusive at both ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<Date>,
    pub to: Option<Date>,
}

impl DateRange {
    pub fn contains(&self, date: Date) -> bool {
        self.from.is_none_or(|f| date >= f) && self.to.is_none_or(|t| date <= t)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};

    use super::*;

    #[test]
    fn empty_subject_filter_matches_everything() {
        let subject = sample_subject(SubjectKind::Kanji, 5);
        assert!(SubjectFilter::default().matches(&subject));
    }

    #[test]
    fn subject_filter_requires_both_fields_when_set() {
        let subject = sample_subject(SubjectKind::Kanji, 5);
        let filter = SubjectFilter {
            kind: Some(SubjectKind::Kanji),
            level: Some(5),
        };
        assert!(filter.matches(&subject));

        let wrong_level = SubjectFilter {
            kind: Some(SubjectKind::Kanji),
            level: Some(6),
        };
        assert!(!wrong_level.matches(&subject));

        let wrong_kind = SubjectFilter {
            kind: Some(SubjectKind::Radical),
            level: Some(5),
        };
        assert!(!wrong_kind.matches(&subject));
    }

    #[test]
    fn time_range_bounds_are_inclusive() {
        let range = TimeRange {
            from: Some(datetime!(2024-01-10 00:00:00 UTC)),
            to: Some(datetime!(2024-01-11 00:00:00 UTC)),
        };
        assert!(range.contains(datetime!(2024-01-10 00:00:00 UTC)));
        assert!(range.contains(datetime!(2024-01-11 00:00:00 UTC)));
        assert!(!range.contains(datetime!(2024-01-11 00:00:01 UTC)));
        assert!(!range.contains(datetime!(2024-01-09 23:59:59 UTC)));
    }

    #[test]
    fn date_range_bounds_are_inclusive() {
        let range = DateRange {
            from: Some(date!(2024 - 01 - 10)),
            to: Some(date!(2024 - 01 - 12)),
        };
        assert!(range.contains(date!(2024 - 01 - 10)));
        assert!(range.contains(date!(2024 - 01 - 12)));
        assert!(!range.contains(date!(2024 - 01 - 13)));
    }

    fn sample_subject(kind: SubjectKind, level: i64) -> Subject {
        Subject {
            id: 1,
            kind,
            url: "https://example.test/subjects/1".to_string(),
            data_updated_at: datetime!(2024-01-01 00:00:00 UTC),
            data: crate::SubjectData {
                level,
                characters: None,
                meanings: vec![],
                readings: vec![],
            },
        }
    }
}
