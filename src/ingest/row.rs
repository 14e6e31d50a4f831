use crate::ingest::record::{MemberRecord, RawRow};

/// Which column contract an uploaded file follows.
///
/// `Full` is the bookkeeping export (amounts required); `NotificationOnly`
/// is the slimmer reminder export where the member name arrives split in two
/// and no amount column exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    Full,
    NotificationOnly,
}

impl SchemaVariant {
    /// Headers that must be present for this variant. Matching is exact
    /// after trimming, case-sensitive.
    pub fn required_headers(&self) -> &'static [&'static str] {
        match self {
            SchemaVariant::Full => &["Member Name", "Amount", "Agency"],
            SchemaVariant::NotificationOnly => &[
                "Agency Email Address",
                "memberFirstName",
                "memberLastName",
                "delinquent_days",
            ],
        }
    }
}

/// Fetch a cell by header, trimmed; whitespace-only cells count as absent.
fn field(row: &RawRow, key: &str) -> Option<String> {
    row.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse an amount after stripping currency symbols and thousands
/// separators. Must be a non-negative finite number; `"0"` is valid.
fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
    match cleaned.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Some(v),
        _ => None,
    }
}

/// Map one raw row into a `MemberRecord`, or a human-readable rejection
/// reason. Rejections are ordinary values, never errors: a bad row must not
/// abort the rows after it.
pub fn map_row(row: &RawRow, variant: SchemaVariant) -> Result<MemberRecord, String> {
    match variant {
        SchemaVariant::Full => map_full(row),
        SchemaVariant::NotificationOnly => map_notification_only(row),
    }
}

fn map_full(row: &RawRow) -> Result<MemberRecord, String> {
    let name = field(row, "Member Name");
    let agency_name = field(row, "Agency");
    let amount_raw = field(row, "Amount");

    let (name, agency_name, amount_raw) = match (name, agency_name, amount_raw) {
        (Some(n), Some(a), Some(amt)) => (n, a, amt),
        _ => return Err("missing required fields".to_string()),
    };

    let amount_due = parse_amount(&amount_raw)
        .ok_or_else(|| format!("invalid amount \"{}\"", amount_raw))?;

    let days_late = parse_days_late(row, "Days Late")?;

    Ok(MemberRecord {
        name,
        amount_due: Some(amount_due),
        agency_name,
        agency_email: field(row, "Agency Email"),
        days_late,
        member_id: field(row, "Member ID"),
        phone: field(row, "Phone"),
        email: field(row, "Email"),
    })
}

fn map_notification_only(row: &RawRow) -> Result<MemberRecord, String> {
    let first = field(row, "memberFirstName");
    let agency_email = field(row, "Agency Email Address");

    let (first, agency_email) = match (first, agency_email) {
        (Some(f), Some(e)) => (f, e),
        _ => return Err("missing required fields".to_string()),
    };

    let name = match field(row, "memberLastName") {
        Some(last) => format!("{} {}", first, last),
        None => first,
    };

    let days_late = parse_days_late(row, "delinquent_days")?;

    // No dedicated agency column in this export; the contact address doubles
    // as the agency identity when one is not provided.
    let agency_name = field(row, "Agency").unwrap_or_else(|| agency_email.clone());

    Ok(MemberRecord {
        name,
        amount_due: None,
        agency_name,
        agency_email: Some(agency_email),
        days_late,
        member_id: field(row, "Member ID"),
        phone: field(row, "Phone"),
        email: field(row, "Email"),
    })
}

/// Optional-if-absent, mandatory-if-present: a missing lateness cell is fine,
/// but unparsable text in one is a hard reject for the row.
fn parse_days_late(row: &RawRow, key: &str) -> Result<Option<u32>, String> {
    match field(row, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|_| format!("invalid days late \"{}\"", raw)),
    }
}
