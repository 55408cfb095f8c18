//! SRS stage numbering and the stage-name grouping used by the read API.

/// Stage 0: unlocked but never studied. Excluded from daily snapshots.
pub const UNSTARTED: i64 = 0;

/// Stage 9: retired from review rotation.
pub const BURNED: i64 = 9;

/// Map a numeric SRS stage onto its tier name.
///
/// Stages 1..=4 collapse into `apprentice` and 5..=6 into `guru`;
/// consumers that aggregate by name must sum counts across the
/// collapsed stages. Anything outside 1..=9 is `unknown`.
pub fn stage_name(stage: i64) -> &'static str {
    match stage {
        1..=4 => "apprentice",
        5..=6 => "guru",
        7 => "master",
        8 => "enlightened",
        9 => "burned",
        _ => "unknown",
    }
}
