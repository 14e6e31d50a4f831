use serde::Serialize;

/// Outcome of checking a file's declared headers against a required set.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderCheck {
    pub valid: bool,
    pub missing_headers: Vec<String>,
    pub found_headers: Vec<String>,
}

/// Check `declared` (already split out of the header row) against the
/// variant's required column set. Headers are trimmed before comparison;
/// the comparison itself is case-sensitive exact match — `amount` does not
/// satisfy `Amount`. Extra columns are ignored.
pub fn validate_headers(declared: &[String], required: &[&str]) -> HeaderCheck {
    let declared: Vec<&str> = declared.iter().map(|h| h.trim()).collect();

    let mut missing_headers = Vec::new();
    let mut found_headers = Vec::new();
    for &req in required {
        if declared.contains(&req) {
            found_headers.push(req.to_string());
        } else {
            missing_headers.push(req.to_string());
        }
    }

    HeaderCheck {
        valid: missing_headers.is_empty(),
        missing_headers,
        found_headers,
    }
}
