use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::duty::parse_instant;
use crate::geo::LatLng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    CheckIn,
    CheckOut,
    PatrolUpdate,
    GeofenceViolation,
    IncidentReport,
    Other,
}

impl ActivityKind {
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "check-in" => ActivityKind::CheckIn,
            "check-out" => ActivityKind::CheckOut,
            "patrol-update" => ActivityKind::PatrolUpdate,
            "geofence-violation" => ActivityKind::GeofenceViolation,
            "incident-report" => ActivityKind::IncidentReport,
            _ => ActivityKind::Other,
        }
    }
}

/// A compliance log entry reported from the field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: ActivityKind,
    pub officer_id: String,
    pub duty_id: Option<String>,
    pub location: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Activity {
    pub fn from_document(id: &str, doc: &JsonValue) -> Option<Self> {
        let text = |field: &str| {
            doc.get(field)
                .and_then(JsonValue::as_str)
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };

        if !doc.is_object() {
            return None;
        }

        let duty_id = Some(text("dutyId")).filter(|d| !d.is_empty());

        Some(Self {
            id: id.to_string(),
            title: text("title"),
            description: text("description"),
            kind: ActivityKind::parse(&text("type")),
            officer_id: text("officerId"),
            duty_id,
            location: text("location"),
            timestamp: doc.get("timestamp").and_then(parse_instant),
        })
    }

    pub fn point(&self) -> Option<LatLng> {
        LatLng::parse(&self.location)
    }
}

/// Most recent entries first, at most `limit` of them.
pub fn recent(activities: &[Activity], limit: usize) -> Vec<Activity> {
    let mut sorted = activities.to_vec();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted.truncate(limit);
    sorted
}

pub fn for_officer<'a>(activities: &'a [Activity], officer_id: &'a str) -> impl Iterator<Item = &'a Activity> {
    activities.iter().filter(move |a| a.officer_id == officer_id)
}

pub fn for_duty<'a>(activities: &'a [Activity], duty_id: &'a str) -> impl Iterator<Item = &'a Activity> {
    activities
        .iter()
        .filter(move |a| a.duty_id.as_deref() == Some(duty_id))
}
