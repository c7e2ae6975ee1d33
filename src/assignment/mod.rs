//! Turns a dispatcher's assignment request into a stored duty.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use crate::geo::{build_circle_polygon, GeoError, LatLng};
use crate::resolver::matching_officers;
use crate::store::{DutyStore, StoreError};
use crate::utils::{Config, DutyStatus, DutyType, NewDuty, Officer};

const LOCAL_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error("Please select a location on the map")]
    MissingLocation,

    #[error("Please select at least one officer and duty type")]
    MissingDetails,

    #[error("No valid officers selected")]
    NoValidOfficers,

    #[error("Unknown officers: {}", .0.join(", "))]
    UnknownOfficers(Vec<String>),

    #[error("Invalid date format")]
    InvalidDate,

    #[error("End time must be after start time")]
    InvertedWindow,

    #[error(transparent)]
    Geometry(#[from] GeoError),

    #[error("failed to store duty: {0}")]
    Store(#[from] StoreError),
}

impl AssignmentError {
    /// True for errors caused by the request itself rather than the store.
    pub fn is_invalid_request(&self) -> bool {
        !matches!(self, AssignmentError::Store(_))
    }
}

/// What a dispatcher submits. Times are RFC 3339, or local wall-clock time
/// (`2024-06-01T18:00`) read at the configured UTC offset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    #[serde(default)]
    pub officer_ids: Vec<String>,
    #[serde(default)]
    pub vehicle_ids: Vec<String>,
    pub duty_type: Option<DutyType>,
    pub center: Option<LatLng>,
    pub radius_m: Option<f64>,
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(default)]
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentPolicy {
    pub default_radius_m: f64,
    pub minimum_radius_m: f64,
    pub sides: usize,
    pub utc_offset: FixedOffset,
}

impl AssignmentPolicy {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            default_radius_m: config.default_radius_m,
            minimum_radius_m: config.minimum_radius_m,
            sides: config.polygon_sides,
            utc_offset: config.utc_offset()?,
        })
    }

    /// Requested radius, or the default, never below the minimum.
    pub fn radius(&self, requested: Option<f64>) -> f64 {
        requested
            .unwrap_or(self.default_radius_m)
            .max(self.minimum_radius_m)
    }
}

impl Default for AssignmentPolicy {
    fn default() -> Self {
        // 330 minutes east of UTC is always in range.
        let ist = FixedOffset::east_opt(330 * 60).unwrap_or_else(|| Utc.fix());
        Self {
            default_radius_m: 200.0,
            minimum_radius_m: crate::geo::DEFAULT_MINIMUM_RADIUS_M,
            sides: crate::geo::DEFAULT_SIDES,
            utc_offset: ist,
        }
    }
}

fn clean_ids(ids: &[String]) -> Vec<String> {
    ids.iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Parses an RFC 3339 instant, or a local wall-clock time at `offset`.
pub fn parse_time(text: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&Utc));
    }

    LOCAL_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|local| local.with_timezone(&Utc))
}

/// Validates `request` against the roster and builds the duty to store.
pub fn build_duty(
    request: &AssignmentRequest,
    roster: &[Officer],
    policy: &AssignmentPolicy,
    now: DateTime<Utc>,
) -> Result<NewDuty, AssignmentError> {
    let center = request.center.ok_or(AssignmentError::MissingLocation)?;
    let area = build_circle_polygon(center, policy.radius(request.radius_m), policy.sides)?;

    let officer_ids = clean_ids(&request.officer_ids);
    let duty_type = match request.duty_type {
        Some(duty_type) if !officer_ids.is_empty() => duty_type,
        _ => return Err(AssignmentError::MissingDetails),
    };

    let matched = matching_officers(&officer_ids, roster);
    if matched.is_empty() {
        return Err(AssignmentError::NoValidOfficers);
    }
    let unknown: Vec<String> = officer_ids
        .iter()
        .filter(|id| !matched.iter().any(|o| o.id.trim() == id.as_str() || o.staff_id.trim() == id.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(AssignmentError::UnknownOfficers(unknown));
    }

    let parse = |value: &Option<String>| {
        value
            .as_deref()
            .and_then(|text| parse_time(text, policy.utc_offset))
            .ok_or(AssignmentError::InvalidDate)
    };
    let start_time = parse(&request.start)?;
    let end_time = parse(&request.end)?;
    if start_time >= end_time {
        return Err(AssignmentError::InvertedWindow);
    }

    Ok(NewDuty {
        officer_ids,
        vehicle_ids: clean_ids(&request.vehicle_ids),
        duty_type,
        area,
        start_time,
        end_time,
        status: DutyStatus::Incomplete,
        comments: request.comments.trim().to_string(),
        assigned_at: now,
    })
}

/// Builds and stores a duty, returning the new duty id.
#[instrument(skip_all, fields(duty.type = ?request.duty_type, duty.officers = request.officer_ids.len()))]
pub async fn assign<S>(
    store: &S,
    request: &AssignmentRequest,
    roster: &[Officer],
    policy: &AssignmentPolicy,
    now: DateTime<Utc>,
) -> Result<String, AssignmentError>
where
    S: DutyStore + ?Sized,
{
    let duty = build_duty(request, roster, policy, now)?;
    let id = store.create(duty).await?;
    log::info!("Assigned duty {}", id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{centroid, effective_radius};
    use crate::store::MemoryStore;

    fn roster() -> Vec<Officer> {
        vec![Officer {
            id: "o1".to_string(),
            staff_id: "P1".to_string(),
            name: "Sharma".to_string(),
            designation: "Constable".to_string(),
            nature_of_work: String::new(),
        }]
    }

    fn request() -> AssignmentRequest {
        AssignmentRequest {
            officer_ids: vec!["o1".to_string()],
            vehicle_ids: vec![],
            duty_type: Some(DutyType::Naka),
            center: Some(LatLng::new(15.30, 74.12)),
            radius_m: None,
            start: Some("2024-06-01T18:00".to_string()),
            end: Some("2024-06-02T02:00".to_string()),
            comments: " Highway junction ".to_string(),
        }
    }

    #[test]
    fn test_valid_request_builds_incomplete_duty() {
        let now = Utc::now();
        let duty = build_duty(&request(), &roster(), &AssignmentPolicy::default(), now).unwrap();

        assert_eq!(duty.status, DutyStatus::Incomplete);
        assert_eq!(duty.area.len(), 16);
        assert_eq!(duty.assigned_at, now);
        assert_eq!(duty.comments, "Highway junction");
        assert!(duty.vehicle_ids.is_empty());

        // 18:00 IST
        assert_eq!(duty.start_time, Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap());

        let center = centroid(&duty.area).unwrap();
        let radius = effective_radius(&duty.area, center, 50.0);
        assert!((radius - 200.0).abs() < 0.5, "radius {}", radius);
    }

    #[test]
    fn test_small_radius_is_clamped() {
        let mut req = request();
        req.radius_m = Some(10.0);

        let duty = build_duty(&req, &roster(), &AssignmentPolicy::default(), Utc::now()).unwrap();
        let center = centroid(&duty.area).unwrap();
        assert!(effective_radius(&duty.area, center, 0.0) >= 49.9);
    }

    #[test]
    fn test_missing_pieces_rejected() {
        let policy = AssignmentPolicy::default();

        let mut req = request();
        req.center = None;
        assert!(matches!(build_duty(&req, &roster(), &policy, Utc::now()), Err(AssignmentError::MissingLocation)));

        let mut req = request();
        req.officer_ids = vec![" ".to_string()];
        assert!(matches!(build_duty(&req, &roster(), &policy, Utc::now()), Err(AssignmentError::MissingDetails)));

        let mut req = request();
        req.duty_type = None;
        assert!(matches!(build_duty(&req, &roster(), &policy, Utc::now()), Err(AssignmentError::MissingDetails)));
    }

    #[test]
    fn test_out_of_range_center_rejected() {
        let mut req = request();
        req.center = Some(LatLng::new(95.0, 74.12));

        let err = build_duty(&req, &roster(), &AssignmentPolicy::default(), Utc::now()).unwrap_err();
        assert!(matches!(err, AssignmentError::Geometry(GeoError::InvalidCoordinate { .. })));
        assert!(err.is_invalid_request());
    }

    #[test]
    fn test_unknown_officers_rejected() {
        let policy = AssignmentPolicy::default();

        let mut req = request();
        req.officer_ids = vec!["ghost".to_string()];
        let err = build_duty(&req, &roster(), &policy, Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "No valid officers selected");

        req.officer_ids = vec!["o1".to_string(), "ghost".to_string()];
        let err = build_duty(&req, &roster(), &policy, Utc::now()).unwrap_err();
        assert!(matches!(err, AssignmentError::UnknownOfficers(ids) if ids == vec!["ghost"]));
    }

    #[test]
    fn test_staff_id_accepted() {
        let mut req = request();
        req.officer_ids = vec!["P1".to_string()];
        assert!(build_duty(&req, &roster(), &AssignmentPolicy::default(), Utc::now()).is_ok());
    }

    #[test]
    fn test_time_window_validated() {
        let policy = AssignmentPolicy::default();

        let mut req = request();
        req.end = req.start.clone();
        let err = build_duty(&req, &roster(), &policy, Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "End time must be after start time");

        let mut req = request();
        req.start = Some("tonight".to_string());
        assert!(matches!(build_duty(&req, &roster(), &policy, Utc::now()), Err(AssignmentError::InvalidDate)));
    }

    #[test]
    fn test_parse_time_forms() {
        let utc = Utc.fix();
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
        assert_eq!(parse_time("2024-06-01T18:00:00Z", utc), Some(expected));
        assert_eq!(parse_time("2024-06-01T18:00", utc), Some(expected));
        assert_eq!(parse_time("2024-06-01T18:00:00", utc), Some(expected));
        assert_eq!(parse_time("01/06/2024", utc), None);
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let req: AssignmentRequest = serde_json::from_value(serde_json::json!({
            "officerIds": ["o1"],
            "dutyType": "patrol",
            "center": {"lat": 15.3, "lng": 74.1},
            "radiusM": 300,
            "start": "2024-06-01T18:00",
            "end": "2024-06-01T22:00"
        }))
        .unwrap();

        assert_eq!(req.duty_type, Some(DutyType::Patrol));
        assert_eq!(req.radius_m, Some(300.0));
        assert!(req.comments.is_empty());
    }

    #[tokio::test]
    async fn test_assign_writes_to_store() {
        let store = MemoryStore::new();
        let id = assign(&store, &request(), &roster(), &AssignmentPolicy::default(), Utc::now())
            .await
            .unwrap();

        let duties = store.subscribe().borrow().clone();
        assert_eq!(duties.len(), 1);
        assert_eq!(duties[0].id, id);
        assert_eq!(duties[0].status, Some(DutyStatus::Incomplete));
        assert_eq!(duties[0].duty_type, Some(DutyType::Naka));
    }
}
