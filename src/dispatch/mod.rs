pub mod transport;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::aggregate::AgencyGroups;
pub use transport::{HttpTransport, Transport};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex should parse"));

/// Notification granularity: one send per agency group, or one per member
/// record addressed to that record's own agency email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    PerAgency,
    PerMember,
}

/// One line item inside a notification payload.
#[derive(Debug, Clone, Serialize)]
pub struct PayloadTarget {
    pub name: String,
    pub delinquent_days: u32,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_due: Option<f64>,
}

/// The JSON body handed to the transport: a reply-to address plus the line
/// items, with agency-level totals when sending one notice per agency.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub reply_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    pub targets: Vec<PayloadTarget>,
}

/// One planned send: who it is about, where it goes, what it says.
#[derive(Debug, Clone)]
pub struct DispatchTarget {
    pub identity: String,
    pub recipient: String,
    pub payload: NotificationPayload,
}

/// A pre-send contract breach on one field of one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetViolation {
    pub index: usize,
    pub identity: String,
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Sent,
    Failed,
}

/// Result of one attempt. Exactly one of `provider_reference` /
/// `failure_detail` is populated, matching `kind`.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub identity: String,
    pub recipient: String,
    pub kind: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
}

/// Final report for one batch. Every attempt appears exactly once across
/// `sent` + `failed`; `overall_success` is true iff `failed` is empty.
#[derive(Debug, Serialize)]
pub struct BatchDispatchReport {
    pub overall_success: bool,
    pub sent: Vec<DispatchOutcome>,
    pub failed: Vec<DispatchOutcome>,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound on concurrent in-flight sends.
    pub max_in_flight: usize,
    /// Per-attempt deadline; an elapsed timer is a failed outcome, not a
    /// batch error.
    pub send_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 3,
            send_timeout: Duration::from_secs(30),
        }
    }
}

/// One notification per agency group, addressed to the group's reconciled
/// email. Groups still needing a lookup produce a target with an empty
/// recipient, which pre-send validation will reject — resolve or filter
/// them before dispatching.
pub fn per_agency_targets(groups: &AgencyGroups, reply_to: &str) -> Vec<DispatchTarget> {
    groups
        .values()
        .map(|group| {
            let recipient = group.agency_email.clone().unwrap_or_default();
            let targets: Vec<PayloadTarget> = group
                .members
                .iter()
                .map(|m| PayloadTarget {
                    name: m.name.clone(),
                    delinquent_days: m.days_late.unwrap_or(0),
                    email: recipient.clone(),
                    amount_due: m.amount_due,
                })
                .collect();
            let total_amount: f64 = group.members.iter().filter_map(|m| m.amount_due).sum();
            DispatchTarget {
                identity: group.agency_name.clone(),
                recipient,
                payload: NotificationPayload {
                    reply_to: reply_to.to_string(),
                    member_count: Some(group.members.len()),
                    total_amount: Some(total_amount),
                    targets,
                },
            }
        })
        .collect()
}

/// One notification per member record, addressed to that record's own
/// agency email; members within the same agency succeed or fail
/// independently.
pub fn per_member_targets(groups: &AgencyGroups, reply_to: &str) -> Vec<DispatchTarget> {
    groups
        .values()
        .flat_map(|group| group.members.iter())
        .map(|m| {
            let recipient = m.agency_email.clone().unwrap_or_default();
            DispatchTarget {
                identity: m.name.clone(),
                recipient: recipient.clone(),
                payload: NotificationPayload {
                    reply_to: reply_to.to_string(),
                    member_count: None,
                    total_amount: None,
                    targets: vec![PayloadTarget {
                        name: m.name.clone(),
                        delinquent_days: m.days_late.unwrap_or(0),
                        email: recipient,
                        amount_due: m.amount_due,
                    }],
                },
            }
        })
        .collect()
}

/// Check every field of every target. Any violation blocks the whole batch
/// before the first send attempt; this is distinct from per-item transport
/// failure, which never does.
pub fn validate_targets(targets: &[DispatchTarget]) -> Vec<TargetViolation> {
    let mut violations = Vec::new();

    for (index, target) in targets.iter().enumerate() {
        if target.recipient.is_empty() {
            violations.push(TargetViolation {
                index,
                identity: target.identity.clone(),
                field: "recipient",
                message: "recipient address missing".to_string(),
            });
        } else if !EMAIL_RE.is_match(&target.recipient) {
            violations.push(TargetViolation {
                index,
                identity: target.identity.clone(),
                field: "recipient",
                message: format!("\"{}\" is not a valid email address", target.recipient),
            });
        }

        for line in &target.payload.targets {
            if line.name.trim().is_empty() {
                violations.push(TargetViolation {
                    index,
                    identity: target.identity.clone(),
                    field: "name",
                    message: "display name is empty".to_string(),
                });
            }
            if let Some(amount) = line.amount_due {
                if !amount.is_finite() || amount < 0.0 {
                    violations.push(TargetViolation {
                        index,
                        identity: target.identity.clone(),
                        field: "amount_due",
                        message: format!("{} is not a non-negative amount", amount),
                    });
                }
            }
        }
    }

    violations
}

/// Deliver a whole batch: validate everything up front, then attempt every
/// target with bounded fan-out. Each attempt settles into its own outcome
/// slot; nothing is shared between in-flight sends, and one target's failure
/// or slowness never cancels another's attempt.
pub async fn dispatch_batch<T: Transport>(
    transport: &T,
    targets: &[DispatchTarget],
    config: &DispatchConfig,
) -> Result<BatchDispatchReport> {
    let violations = validate_targets(targets);
    if !violations.is_empty() {
        let detail: Vec<String> = violations
            .iter()
            .map(|v| {
                format!(
                    "target {} ({}): {}: {}",
                    v.index, v.identity, v.field, v.message
                )
            })
            .collect();
        bail!(
            "dispatch batch rejected, {} invalid field(s):\n{}",
            violations.len(),
            detail.join("\n")
        );
    }

    let started = Utc::now();
    let semaphore = Semaphore::new(config.max_in_flight);

    let attempts = targets.iter().map(|target| {
        let semaphore = &semaphore;
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore never closed");
            info!(
                identity = %target.identity,
                recipient = %target.recipient,
                "sending notification"
            );
            let attempt = transport.deliver(&target.recipient, &target.payload);
            match tokio::time::timeout(config.send_timeout, attempt).await {
                Ok(Ok(reference)) => DispatchOutcome {
                    identity: target.identity.clone(),
                    recipient: target.recipient.clone(),
                    kind: OutcomeKind::Sent,
                    provider_reference: Some(reference),
                    failure_detail: None,
                },
                Ok(Err(err)) => {
                    error!(identity = %target.identity, "send failed: {:#}", err);
                    failed_outcome(target, format!("{:#}", err))
                }
                Err(_) => {
                    error!(identity = %target.identity, "send timed out");
                    failed_outcome(
                        target,
                        format!("send timed out after {:?}", config.send_timeout),
                    )
                }
            }
        }
    });

    let outcomes = futures::future::join_all(attempts).await;
    let (sent, failed): (Vec<_>, Vec<_>) = outcomes
        .into_iter()
        .partition(|o| o.kind == OutcomeKind::Sent);

    info!(sent = sent.len(), failed = failed.len(), "batch settled");

    Ok(BatchDispatchReport {
        overall_success: failed.is_empty(),
        sent,
        failed,
        started,
        finished: Utc::now(),
    })
}

fn failed_outcome(target: &DispatchTarget, detail: String) -> DispatchOutcome {
    DispatchOutcome {
        identity: target.identity.clone(),
        recipient: target.recipient.clone(),
        kind: OutcomeKind::Failed,
        provider_reference: None,
        failure_detail: Some(detail),
    }
}
