//! Time-based duty state: what is visible now, what has run out, and which
//! stored statuses need to be closed out.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::utils::{Duty, DutyStatus};

/// Display status derived from the stored status and the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveStatus {
    Active,
    Incomplete,
    Completed,
    Expired,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub duty_id: String,
    pub status: DutyStatus,
}

/// Whether a duty belongs on the map and in active lists at `now`. Does not
/// look at or change anything but the duty itself.
pub fn is_displayable(duty: &Duty, now: DateTime<Utc>) -> bool {
    duty.has_area() && !duty.is_terminal() && !duty.has_lapsed(now)
}

pub fn classify(duty: &Duty, now: DateTime<Utc>) -> EffectiveStatus {
    if duty.is_terminal() {
        return EffectiveStatus::Completed;
    }
    if duty.has_lapsed(now) {
        return EffectiveStatus::Expired;
    }

    match &duty.status {
        Some(DutyStatus::Active) => EffectiveStatus::Active,
        Some(DutyStatus::Incomplete) | Some(DutyStatus::Assigned) => EffectiveStatus::Incomplete,
        Some(DutyStatus::Missed) => EffectiveStatus::Expired,
        _ => EffectiveStatus::Unknown,
    }
}

/// Status writes that move every lapsed, still-open duty to `completed`.
pub fn sweep_expired(duties: &[Duty], now: DateTime<Utc>) -> Vec<StatusUpdate> {
    duties
        .iter()
        .filter(|d| d.has_lapsed(now) && !d.is_terminal())
        .map(|d| StatusUpdate {
            duty_id: d.id.clone(),
            status: DutyStatus::Completed,
        })
        .collect()
}

pub fn current_duties(duties: &[Duty], now: DateTime<Utc>) -> Vec<&Duty> {
    duties.iter().filter(|d| is_displayable(d, now)).collect()
}

#[derive(Debug, Default)]
pub struct DutyBuckets<'a> {
    pub active: Vec<&'a Duty>,
    pub completed: Vec<&'a Duty>,
}

/// Splits duties into the dashboard's active and completed lists. Active
/// duties must have an area; assigned duties and incomplete ones without an
/// end time are left out of both.
pub fn partition(duties: &[Duty], now: DateTime<Utc>) -> DutyBuckets<'_> {
    let mut buckets = DutyBuckets::default();

    for duty in duties {
        let running_out = duty.end_time.is_some_and(|end| end <= now);

        if duty.is_terminal() || running_out {
            buckets.completed.push(duty);
        } else if duty.has_area()
            && (matches!(duty.status, Some(DutyStatus::Active))
                || (matches!(duty.status, Some(DutyStatus::Incomplete)) && duty.end_time.is_some()))
        {
            buckets.active.push(duty);
        }
    }

    buckets
}
