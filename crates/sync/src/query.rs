//! Read-side query shaping: joins and the nested snapshot projection.
//!
//! Shapes only; no business rules live here. Joins tolerate a missing
//! right-hand side by emitting `null` instead of dropping the row —
//! the store's FK discipline makes that impossible in steady state,
//! but a crashed run from before the current process may have left an
//! earlier pipeline interrupted.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use wanimirror_core::{
    srs, timestamp, Assignment, AssignmentFilter, AssignmentSnapshot, DateRange, Review, Subject,
    SubjectFilter, TimeRange,
};
use wanimirror_storage::{MirrorStore, StorageError};

/// An assignment carrying its referenced subject (`null` if missing).
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentView {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub subject: Option<Subject>,
}

/// A review carrying its referenced assignment and subject.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewView {
    #[serde(flatten)]
    pub review: Review,
    pub assignment: Option<Assignment>,
    pub subject: Option<Subject>,
}

/// `date → stage name → { subject type: count, "total": sum }`,
/// dates ascending (BTreeMap order over ISO dates is chronological).
pub type SnapshotProjection = BTreeMap<String, BTreeMap<String, BTreeMap<String, i64>>>;

/// Read-side facade over a [`MirrorStore`].
pub struct QueryService<S> {
    store: Arc<S>,
}

impl<S: MirrorStore> QueryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn assignments_with_subjects(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<AssignmentView>, StorageError> {
        let assignments = self.store.get_assignments(filter).await?;
        let subjects = self.subject_index().await?;
        Ok(assignments
            .into_iter()
            .map(|assignment| {
                let subject = subjects.get(&assignment.subject_id).cloned();
                AssignmentView {
                    assignment,
                    subject,
                }
            })
            .collect())
    }

    pub async fn reviews_with_context(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<ReviewView>, StorageError> {
        let reviews = self.store.get_reviews(range).await?;
        let subjects = self.subject_index().await?;
        let assignments: HashMap<i64, Assignment> = self
            .store
            .get_assignments(&AssignmentFilter::default())
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();

        Ok(reviews
            .into_iter()
            .map(|review| {
                let assignment = assignments.get(&review.assignment_id).cloned();
                let subject = subjects.get(&review.subject_id).cloned();
                ReviewView {
                    review,
                    assignment,
                    subject,
                }
            })
            .collect())
    }

    pub async fn snapshot_projection(
        &self,
        range: &DateRange,
    ) -> Result<SnapshotProjection, StorageError> {
        let rows = self.store.get_assignment_snapshots(range).await?;
        Ok(project_snapshots(&rows)?)
    }

    async fn subject_index(&self) -> Result<HashMap<i64, Subject>, StorageError> {
        Ok(self
            .store
            .get_subjects(&SubjectFilter::default())
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect())
    }
}

/// Project snapshot rows into the nested map the API emits.
///
/// Numeric stages that share a name (1..=4 are all `apprentice`)
/// accumulate into one bucket, and each stage bucket carries a `total`
/// equal to the sum of its subject-type counts.
pub fn project_snapshots(
    rows: &[AssignmentSnapshot],
) -> Result<SnapshotProjection, time::error::Format> {
    let mut projection = SnapshotProjection::new();
    for row in rows {
        let date = timestamp::format_date(row.date)?;
        let stage = srs::stage_name(row.srs_stage);
        let bucket = projection
            .entry(date)
            .or_default()
            .entry(stage.to_string())
            .or_default();
        *bucket
            .entry(row.subject_type.as_str().to_string())
            .or_insert(0) += row.count;
        *bucket.entry("total".to_string()).or_insert(0) += row.count;
    }
    Ok(projection)
}

#[cfg(test)]
mod tests {
    use time::macros::date;
    use wanimirror_core::SubjectKind;

    use super::*;

    fn row(date: time::Date, stage: i64, kind: SubjectKind, count: i64) -> AssignmentSnapshot {
        AssignmentSnapshot {
            date,
            srs_stage: stage,
            subject_type: kind,
            count,
        }
    }

    #[test]
    fn stages_sharing_a_name_accumulate_and_totals_sum() {
        let d = date!(2024 - 01 - 10);
        let rows = vec![
            row(d, 1, SubjectKind::Radical, 5),
            row(d, 1, SubjectKind::Kanji, 10),
            row(d, 2, SubjectKind::Vocabulary, 8),
            row(d, 5, SubjectKind::Radical, 12),
            row(d, 5, SubjectKind::Kanji, 15),
            row(d, 7, SubjectKind::Vocabulary, 20),
        ];
        let projection = project_snapshots(&rows).expect("projection");
        let day = &projection["2024-01-10"];

        let apprentice = &day["apprentice"];
        assert_eq!(apprentice["radical"], 5);
        assert_eq!(apprentice["kanji"], 10);
        assert_eq!(apprentice["vocabulary"], 8);
        assert_eq!(apprentice["total"], 23);

        let guru = &day["guru"];
        assert_eq!(guru["radical"], 12);
        assert_eq!(guru["kanji"], 15);
        assert_eq!(guru.get("vocabulary"), None);
        assert_eq!(guru["total"], 27);

        let master = &day["master"];
        assert_eq!(master["vocabulary"], 20);
        assert_eq!(master["total"], 20);
    }

    #[test]
    fn dates_enumerate_ascending() {
        let rows = vec![
            row(date!(2024 - 01 - 12), 1, SubjectKind::Kanji, 1),
            row(date!(2024 - 01 - 10), 1, SubjectKind::Kanji, 1),
            row(date!(2024 - 01 - 11), 1, SubjectKind::Kanji, 1),
        ];
        let projection = project_snapshots(&rows).expect("projection");
        let dates: Vec<&str> = projection.keys().map(String::as_str).collect();
        assert_eq!(dates, ["2024-01-10", "2024-01-11", "2024-01-12"]);
    }

    #[test]
    fn empty_input_projects_to_an_empty_map() {
        let projection = project_snapshots(&[]).expect("projection");
        assert!(projection.is_empty());
    }
}
