use serde::Serialize;
use std::collections::BTreeMap;

/// One raw data row as decoded from the file, keyed by (trimmed) header.
/// Cells are kept verbatim; trimming happens at the mapping boundary.
/// Only lives long enough to be mapped or attached to a `ParseError`.
pub type RawRow = BTreeMap<String, String>;

/// Canonical delinquent-member record. Constructed only by the row mapper,
/// and only when every required field is present and well-typed; a bad row
/// never produces a partial record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberRecord {
    pub name: String,
    /// Absent only in the notification-only schema variant.
    pub amount_due: Option<f64>,
    /// Aggregation key. Exact-string match, case-sensitive.
    pub agency_name: String,
    pub agency_email: Option<String>,
    pub days_late: Option<u32>,
    pub member_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// A rejected row, kept alongside the raw cells for diagnostics.
/// `row_number` is the 1-based line in the source file (header is line 1).
#[derive(Debug, Clone, Serialize)]
pub struct ParseError {
    pub row_number: usize,
    pub message: String,
    pub raw: RawRow,
}
