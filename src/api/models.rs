use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::LatLng;
use crate::lifecycle::EffectiveStatus;
use crate::resolver::OfficerSummary;
use crate::utils::{DutyStatus, DutyType};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub sweeper: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DutyBucket {
    #[default]
    All,
    Active,
    Completed,
}

#[derive(Debug, Default, Deserialize)]
pub struct DutyListQuery {
    #[serde(default)]
    pub bucket: DutyBucket,
}

/// A displayable duty with everything the map popup and duty list need.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentDutyResponse {
    pub id: String,
    pub duty_type: Option<DutyType>,
    pub status: Option<DutyStatus>,
    pub effective_status: EffectiveStatus,
    pub officer: OfficerSummary,
    pub vehicles: Vec<String>,
    pub center: LatLng,
    pub radius_m: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateDutyResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DutyStatus,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OfficerQuery {
    #[serde(default)]
    pub available: bool,
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VehicleQuery {
    #[serde(default)]
    pub available: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub officer: Option<String>,
    pub duty: Option<String>,
    pub limit: Option<usize>,
}
