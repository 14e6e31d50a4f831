pub mod decode;
pub mod headers;
pub mod record;
pub mod row;

use anyhow::{bail, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::aggregate::AgencyGroups;
use decode::Table;

pub use headers::{validate_headers, HeaderCheck};
pub use record::{MemberRecord, ParseError, RawRow};
pub use row::{map_row, SchemaVariant};

/// Everything one ingestion produces: agency groups for the valid records,
/// row-level errors in encounter order, and the headline counts. Plain data,
/// safe to serialize for UI or API consumers.
#[derive(Debug, Serialize)]
pub struct ParseResult {
    pub groups: AgencyGroups,
    pub errors: Vec<ParseError>,
    pub total_members: usize,
    pub total_agencies: usize,
}

/// Ingest one uploaded file end to end: extension gate, format decode,
/// header contract, then best-effort row mapping and agency aggregation.
///
/// Only structural problems return `Err` (unsupported extension, unreadable
/// container, missing required headers, zero data rows). Bad rows land in
/// `ParseResult::errors` and never abort the rows after them.
#[tracing::instrument(level = "info", skip(bytes), fields(file = %file_name))]
pub fn parse_upload(bytes: &[u8], file_name: &str, variant: SchemaVariant) -> Result<ParseResult> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let table = match ext.as_str() {
        "csv" => decode::decode_csv(bytes)?,
        "xlsx" | "xls" => decode::decode_workbook(bytes)?,
        _ => bail!("unsupported file type: \"{}\"", file_name),
    };

    parse_table(table, variant)
}

fn parse_table(table: Table, variant: SchemaVariant) -> Result<ParseResult> {
    let check = validate_headers(&table.headers, variant.required_headers());
    if !check.valid {
        bail!(
            "missing required headers: {}",
            check.missing_headers.join(", ")
        );
    }

    if table.rows.is_empty() {
        bail!("no data rows");
    }

    let mut groups = AgencyGroups::new();
    let mut errors = Vec::new();
    let mut total_members = 0usize;

    for data_row in table.rows {
        match map_row(&data_row.cells, variant) {
            Ok(record) => {
                groups.fold(record);
                total_members += 1;
            }
            Err(message) => {
                warn!(row = data_row.line, %message, "rejected row");
                errors.push(ParseError {
                    row_number: data_row.line,
                    message,
                    raw: data_row.cells,
                });
            }
        }
    }

    let total_agencies = groups.len();
    info!(
        total_members,
        total_agencies,
        errors = errors.len(),
        "ingestion complete"
    );

    Ok(ParseResult {
        groups,
        errors,
        total_members,
        total_agencies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::EnvFilter;

    fn init_test_logging() {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,arrears::ingest=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn parse_csv(content: &str) -> Result<ParseResult> {
        parse_upload(content.as_bytes(), "upload.csv", SchemaVariant::Full)
    }

    #[test]
    fn unsupported_extension_is_rejected_before_parsing() {
        let err = parse_upload(b"whatever", "report.pdf", SchemaVariant::Full).unwrap_err();
        assert!(err.to_string().contains("unsupported file type"));
    }

    #[test]
    fn missing_headers_abort_the_whole_ingestion() {
        let err = parse_csv("Member Name,Agency\nJohn,A\n").unwrap_err();
        assert!(err.to_string().contains("missing required headers"));
        assert!(err.to_string().contains("Amount"));
    }

    #[test]
    fn header_only_file_fails_with_no_data_rows() {
        let err = parse_csv("Member Name,Amount,Agency\n").unwrap_err();
        assert!(err.to_string().contains("no data rows"));
    }

    #[test]
    fn reads_an_on_disk_upload() -> Result<()> {
        use std::io::Write;
        let mut tmp = tempfile::Builder::new().suffix(".csv").tempfile()?;
        write!(tmp, "Member Name,Amount,Agency\nJohn,10,ABC\n")?;
        let bytes = std::fs::read(tmp.path())?;
        let name = tmp.path().file_name().unwrap().to_str().unwrap();
        let result = parse_upload(&bytes, name, SchemaVariant::Full)?;
        assert_eq!(result.total_members, 1);
        Ok(())
    }

    #[test]
    fn valid_and_invalid_rows_are_partitioned() {
        init_test_logging();
        let content = "Member Name,Amount,Agency\n\
                       John Doe,1250.50,ABC\n\
                       ,100,ABC\n\
                       Jane Smith,not-a-number,ABC\n\
                       Bob Jones,200,XYZ\n";
        let result = parse_csv(content).unwrap();
        assert_eq!(result.total_members, 2);
        assert_eq!(result.total_agencies, 2);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].row_number, 3);
        assert_eq!(result.errors[0].message, "missing required fields");
        assert_eq!(result.errors[1].row_number, 4);
        assert!(result.errors[1].message.contains("invalid amount"));
        assert!(result.errors[1].message.contains("not-a-number"));
    }

    #[test]
    fn spreadsheet_upload_parses_end_to_end() {
        let bytes = decode::fixtures::workbook_bytes(Some(decode::fixtures::SAMPLE_SHEET));
        let result = parse_upload(&bytes, "members.xlsx", SchemaVariant::Full).unwrap();
        assert_eq!(result.total_members, 2);
        assert_eq!(result.total_agencies, 1);
        assert!(result.errors.is_empty());
        let group = result.groups.get("ABC").unwrap();
        assert_eq!(group.members[0].amount_due, Some(1250.5));
        assert_eq!(group.members[1].amount_due, Some(3500.0));
    }

    #[test]
    fn scenario_single_agency_email_reconciliation() {
        let content = "Member Name,Amount,Agency,Agency Email\n\
                       John Doe,\"$1,250.50\",ABC,\n\
                       Jane Smith,3500.00,ABC,a@abc.com\n";
        let result = parse_csv(content).unwrap();
        assert_eq!(result.total_agencies, 1);
        let group = result.groups.get("ABC").unwrap();
        assert_eq!(group.agency_email.as_deref(), Some("a@abc.com"));
        assert!(!group.needs_lookup);
        assert_eq!(group.members.len(), 2);
        let total: f64 = group.members.iter().filter_map(|m| m.amount_due).sum();
        assert!((total - 4750.50).abs() < 1e-9);
    }

    #[test]
    fn row_missing_agency_reports_row_number_two() {
        let content = "Member Name,Amount,Agency\nJohn Doe,100,\n";
        let result = parse_csv(content).unwrap();
        assert_eq!(result.total_members, 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].row_number, 2);
        assert!(result.errors[0].message.contains("missing required fields"));
    }

    #[test]
    fn error_rows_carry_their_raw_cells() {
        let content = "Member Name,Amount,Agency\nJohn,bad,ABC\n";
        let result = parse_csv(content).unwrap();
        assert_eq!(result.errors[0].raw.get("Amount").unwrap(), "bad");
        assert_eq!(result.errors[0].raw.get("Agency").unwrap(), "ABC");
    }

    #[test]
    fn notification_variant_end_to_end() {
        let content = "Agency Email Address,memberFirstName,memberLastName,delinquent_days\n\
                       billing@xyz.example,Jane,Smith,30\n\
                       billing@xyz.example,Bob,,\n";
        let result = parse_upload(
            content.as_bytes(),
            "reminders.csv",
            SchemaVariant::NotificationOnly,
        )
        .unwrap();
        assert_eq!(result.total_members, 2);
        assert_eq!(result.total_agencies, 1);
        let group = result.groups.get("billing@xyz.example").unwrap();
        assert_eq!(group.members[0].name, "Jane Smith");
        assert_eq!(group.members[1].name, "Bob");
    }

    #[test]
    fn case_mismatched_agency_names_stay_distinct_groups() {
        let content = "Member Name,Amount,Agency\nJohn,10,ABC\nJane,20,abc\n";
        let result = parse_csv(content).unwrap();
        assert_eq!(result.total_agencies, 2);
    }

    #[test]
    fn parse_result_serializes() {
        let content = "Member Name,Amount,Agency\nJohn,10,ABC\n";
        let result = parse_csv(content).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["total_members"], 1);
        assert!(json["groups"]["ABC"]["members"].is_array());
    }
}
