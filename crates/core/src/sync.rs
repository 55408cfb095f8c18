use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The four record classes the sync pipeline pulls, in pipeline order.
///
/// The order of [`DataType::ALL`] is load-bearing: subjects must land
/// before assignments (FK), assignments before reviews (FK), and the
/// statistics capture closes the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Subjects,
    Assignments,
    Reviews,
    Statistics,
}

impl DataType {
    pub const ALL: [DataType; 4] = [
        DataType::Subjects,
        DataType::Assignments,
        DataType::Reviews,
        DataType::Statistics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Subjects => "subjects",
            DataType::Assignments => "assignments",
            DataType::Reviews => "reviews",
            DataType::Statistics => "statistics",
        }
    }

    pub fn parse(s: &str) -> Option<DataType> {
        match s {
            "subjects" => Some(DataType::Subjects),
            "assignments" => Some(DataType::Assignments),
            "reviews" => Some(DataType::Reviews),
            "statistics" => Some(DataType::Statistics),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome descriptor of one per-type sync invocation.
///
/// `records_updated` counts the rows in the fetched batch, including
/// rows whose payload turned out unchanged. `timestamp` is the clock
/// reading captured at sync entry, which is also the watermark written
/// when the step succeeds.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub data_type: DataType,
    pub records_updated: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl SyncResult {
    pub fn succeeded(data_type: DataType, records_updated: u64, timestamp: OffsetDateTime) -> Self {
        Self {
            data_type,
            records_updated,
            success: true,
            error_message: None,
            timestamp,
        }
    }

    pub fn failed(data_type: DataType, message: String, timestamp: OffsetDateTime) -> Self {
        Self {
            data_type,
            records_updated: 0,
            success: false,
            error_message: Some(message),
            timestamp,
        }
    }
}
