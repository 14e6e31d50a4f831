use serde::Serialize;

use crate::aggregate::AgencyGroups;

/// Headline metrics over an aggregated parse. Pure derivation; computing it
/// never mutates the groups.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub total_amount: f64,
    /// Mean of `days_late` over the members that carry one; `0.0` when none
    /// do, never NaN.
    pub average_days_late: f64,
    pub agencies_needing_lookup: usize,
}

pub fn summarize(groups: &AgencyGroups) -> Summary {
    let mut total_amount = 0.0;
    let mut days_sum = 0u64;
    let mut days_count = 0u64;

    for group in groups.values() {
        for member in &group.members {
            if let Some(amount) = member.amount_due {
                total_amount += amount;
            }
            if let Some(days) = member.days_late {
                days_sum += u64::from(days);
                days_count += 1;
            }
        }
    }

    let average_days_late = if days_count == 0 {
        0.0
    } else {
        days_sum as f64 / days_count as f64
    };

    Summary {
        total_amount,
        average_days_late,
        agencies_needing_lookup: groups.values().filter(|g| g.needs_lookup).count(),
    }
}
