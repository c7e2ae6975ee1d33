use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use crate::geo::LatLng;
use crate::resolver::normalize_ids;

/// Document fields that have carried the assigned officers over the life of
/// the collection, newest first.
const OFFICER_FIELDS: [&str; 4] = ["officerUids", "officerIds", "officerUid", "officerId"];
const VEHICLE_FIELDS: [&str; 2] = ["vehicleIds", "vehicleId"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DutyType {
    Naka,
    Patrol,
}

impl DutyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DutyType::Naka => "naka",
            DutyType::Patrol => "patrol",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "naka" => Some(DutyType::Naka),
            "patrol" => Some(DutyType::Patrol),
            _ => None,
        }
    }
}

impl std::fmt::Display for DutyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored duty status. `Complete` and `Completed` are both terminal and are
/// kept apart only so existing documents are written back with the spelling
/// they were read with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DutyStatus {
    Assigned,
    Active,
    Incomplete,
    Complete,
    Completed,
    Missed,
    Other(String),
}

impl DutyStatus {
    pub fn as_str(&self) -> &str {
        match self {
            DutyStatus::Assigned => "assigned",
            DutyStatus::Active => "active",
            DutyStatus::Incomplete => "incomplete",
            DutyStatus::Complete => "complete",
            DutyStatus::Completed => "completed",
            DutyStatus::Missed => "missed",
            DutyStatus::Other(text) => text,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DutyStatus::Complete | DutyStatus::Completed)
    }
}

impl From<&str> for DutyStatus {
    fn from(text: &str) -> Self {
        match text.trim() {
            "assigned" => DutyStatus::Assigned,
            "active" => DutyStatus::Active,
            "incomplete" => DutyStatus::Incomplete,
            "complete" => DutyStatus::Complete,
            "completed" => DutyStatus::Completed,
            "missed" => DutyStatus::Missed,
            other => DutyStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for DutyStatus {
    fn from(text: String) -> Self {
        DutyStatus::from(text.as_str())
    }
}

impl From<DutyStatus> for String {
    fn from(status: DutyStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for DutyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A duty as read from the store, with every legacy field shape already
/// decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Duty {
    pub id: String,
    pub officer_ids: Vec<String>,
    pub vehicle_ids: Vec<String>,
    pub duty_type: Option<DutyType>,
    pub area: Vec<LatLng>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<DutyStatus>,
    pub comments: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
}

impl Duty {
    /// Decodes a stored document. Never fails: unreadable fields fall back to
    /// empty values so one bad record cannot take down a whole snapshot.
    pub fn from_document(id: &str, doc: &JsonValue) -> Self {
        let first_present = |fields: &[&str]| {
            fields
                .iter()
                .filter_map(|f| doc.get(*f))
                .find(|v| !v.is_null())
                .map(normalize_ids)
                .unwrap_or_default()
        };

        let area = doc
            .get("location")
            .and_then(|l| l.get("polygon"))
            .or_else(|| doc.get("area"))
            .map(parse_polygon)
            .unwrap_or_default();

        Self {
            id: id.to_string(),
            officer_ids: first_present(&OFFICER_FIELDS[..]),
            vehicle_ids: first_present(&VEHICLE_FIELDS[..]),
            duty_type: doc
                .get("type")
                .or_else(|| doc.get("dutyType"))
                .and_then(JsonValue::as_str)
                .and_then(DutyType::parse),
            area,
            start_time: doc.get("startTime").and_then(parse_instant),
            end_time: doc.get("endTime").and_then(parse_instant),
            status: doc
                .get("status")
                .and_then(JsonValue::as_str)
                .map(DutyStatus::from),
            comments: doc
                .get("comments")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            assigned_at: doc.get("assignedAt").and_then(parse_instant),
        }
    }

    pub fn has_area(&self) -> bool {
        !self.area.is_empty()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.as_ref().is_some_and(DutyStatus::is_terminal)
    }

    /// True when the end time is set and strictly before `now`.
    pub fn has_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.end_time.is_some_and(|end| end < now)
    }
}

/// A duty about to be written by the assignment workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDuty {
    pub officer_ids: Vec<String>,
    pub vehicle_ids: Vec<String>,
    pub duty_type: DutyType,
    pub area: Vec<LatLng>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: DutyStatus,
    pub comments: String,
    pub assigned_at: DateTime<Utc>,
}

impl NewDuty {
    pub fn to_document(&self) -> JsonValue {
        let mut doc = json!({
            "officerUids": self.officer_ids,
            "type": self.duty_type.as_str(),
            "location": { "polygon": self.area },
            "startTime": self.start_time.to_rfc3339(),
            "endTime": self.end_time.to_rfc3339(),
            "status": self.status.as_str(),
            "assignedAt": self.assigned_at.to_rfc3339(),
            "comments": self.comments,
        });

        if !self.vehicle_ids.is_empty() {
            doc["vehicleIds"] = json!(self.vehicle_ids);
        }

        doc
    }
}

/// Partial update applied to a stored duty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DutyStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl DutyPatch {
    pub fn status(status: DutyStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// The fields to merge into the stored document, stamped with
    /// `updatedAt`.
    pub fn to_fields(&self, now: DateTime<Utc>) -> Map<String, JsonValue> {
        let mut fields = Map::new();
        if let Some(status) = &self.status {
            fields.insert("status".to_string(), json!(status.as_str()));
        }
        if let Some(comments) = &self.comments {
            fields.insert("comments".to_string(), json!(comments));
        }
        fields.insert("updatedAt".to_string(), json!(now.to_rfc3339()));
        fields
    }
}

fn parse_coordinate(value: &JsonValue) -> Option<f64> {
    let number = match value {
        JsonValue::Number(n) => n.as_f64()?,
        JsonValue::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn parse_vertex(value: &JsonValue) -> Option<LatLng> {
    match value {
        JsonValue::Object(obj) => Some(LatLng::new(
            parse_coordinate(obj.get("lat")?)?,
            parse_coordinate(obj.get("lng").or_else(|| obj.get("lon"))?)?,
        )),
        JsonValue::Array(pair) if pair.len() == 2 => Some(LatLng::new(
            parse_coordinate(&pair[0])?,
            parse_coordinate(&pair[1])?,
        )),
        _ => None,
    }
}

/// Reads polygon vertices, skipping any that do not carry two finite
/// coordinates.
pub fn parse_polygon(value: &JsonValue) -> Vec<LatLng> {
    value
        .as_array()
        .map(|points| points.iter().filter_map(parse_vertex).collect())
        .unwrap_or_default()
}

/// Reads an instant stored as RFC 3339 text, a `{seconds, nanoseconds}`
/// timestamp object or epoch milliseconds.
pub fn parse_instant(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        JsonValue::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
        JsonValue::Object(obj) => {
            let seconds = obj
                .get("seconds")
                .or_else(|| obj.get("_seconds"))
                .and_then(JsonValue::as_i64)?;
            let nanos = obj
                .get("nanoseconds")
                .or_else(|| obj.get("_nanoseconds"))
                .and_then(JsonValue::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_aliases_are_terminal() {
        assert!(DutyStatus::from("complete").is_terminal());
        assert!(DutyStatus::from("completed").is_terminal());
        assert!(!DutyStatus::from("incomplete").is_terminal());
        assert!(!DutyStatus::from("missed").is_terminal());
        assert_eq!(DutyStatus::from("complete").as_str(), "complete");
        assert_eq!(DutyStatus::from("on-hold"), DutyStatus::Other("on-hold".to_string()));
    }

    #[test]
    fn test_status_serde_keeps_spelling() {
        let status: DutyStatus = serde_json::from_value(json!("complete")).unwrap();
        assert_eq!(status, DutyStatus::Complete);
        assert_eq!(serde_json::to_value(&status).unwrap(), json!("complete"));
    }

    #[test]
    fn test_from_current_document() {
        let doc = json!({
            "officerUids": ["o1", " o2 "],
            "vehicleIds": ["v1"],
            "type": "naka",
            "location": { "polygon": [
                {"lat": 15.30, "lng": 74.12},
                {"lat": 15.31, "lng": 74.12},
                {"lat": 15.31, "lng": 74.13}
            ]},
            "startTime": "2024-06-01T18:00:00.000Z",
            "endTime": "2024-06-02T02:00:00.000Z",
            "status": "incomplete",
            "assignedAt": "2024-06-01T12:00:00Z",
            "comments": "Highway junction"
        });

        let duty = Duty::from_document("d1", &doc);
        assert_eq!(duty.id, "d1");
        assert_eq!(duty.officer_ids, vec!["o1", "o2"]);
        assert_eq!(duty.vehicle_ids, vec!["v1"]);
        assert_eq!(duty.duty_type, Some(DutyType::Naka));
        assert_eq!(duty.area.len(), 3);
        assert_eq!(duty.end_time, Some(Utc.with_ymd_and_hms(2024, 6, 2, 2, 0, 0).unwrap()));
        assert_eq!(duty.status, Some(DutyStatus::Incomplete));
        assert_eq!(duty.comments.as_deref(), Some("Highway junction"));
    }

    #[test]
    fn test_from_legacy_document() {
        let doc = json!({
            "officerUid": "o9",
            "type": "PATROL",
            "area": [[15.30, 74.12], ["15.31", "74.12"], [15.31, "north"], {"lat": 15.32}],
            "endTime": {"seconds": 1717279200, "nanoseconds": 0},
            "status": "completed"
        });

        let duty = Duty::from_document("legacy", &doc);
        assert_eq!(duty.officer_ids, vec!["o9"]);
        assert!(duty.vehicle_ids.is_empty());
        assert_eq!(duty.duty_type, Some(DutyType::Patrol));
        assert_eq!(duty.area, vec![LatLng::new(15.30, 74.12), LatLng::new(15.31, 74.12)]);
        assert_eq!(duty.end_time, DateTime::from_timestamp(1717279200, 0));
        assert!(duty.is_terminal());
    }

    #[test]
    fn test_officer_field_precedence() {
        let doc = json!({ "officerUids": null, "officerIds": [{"id": "a"}], "officerId": "b" });
        assert_eq!(Duty::from_document("x", &doc).officer_ids, vec!["a"]);
    }

    #[test]
    fn test_oldest_field_names() {
        let doc = json!({ "officerId": "o7", "vehicleId": "v3", "dutyType": "naka" });

        let duty = Duty::from_document("old", &doc);
        assert_eq!(duty.officer_ids, vec!["o7"]);
        assert_eq!(duty.vehicle_ids, vec!["v3"]);
        assert_eq!(duty.duty_type, Some(DutyType::Naka));
    }

    #[test]
    fn test_oldest_officer_field_with_wrapped_ids() {
        let duty = Duty::from_document("old", &json!({ "officerId": [{"value": 9}] }));
        assert_eq!(duty.officer_ids, vec!["9"]);
        assert!(duty.vehicle_ids.is_empty());
        assert!(duty.duty_type.is_none());
    }

    #[test]
    fn test_garbage_document_decodes_empty() {
        let duty = Duty::from_document("junk", &json!("not an object"));
        assert!(duty.officer_ids.is_empty());
        assert!(!duty.has_area());
        assert!(duty.status.is_none());
        assert!(duty.end_time.is_none());
    }

    #[test]
    fn test_parse_instant_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 18, 30, 0).unwrap();
        assert_eq!(parse_instant(&json!("2024-06-02T00:00:00+05:30")), Some(expected));
        assert_eq!(parse_instant(&json!(expected.timestamp_millis())), Some(expected));
        assert_eq!(parse_instant(&json!({"_seconds": expected.timestamp()})), Some(expected));
        assert_eq!(parse_instant(&json!("tomorrow")), None);
        assert_eq!(parse_instant(&JsonValue::Null), None);
    }

    #[test]
    fn test_new_duty_document_round_trips() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
        let new_duty = NewDuty {
            officer_ids: vec!["o1".to_string()],
            vehicle_ids: vec![],
            duty_type: DutyType::Patrol,
            area: vec![LatLng::new(15.3, 74.1), LatLng::new(15.4, 74.1), LatLng::new(15.4, 74.2)],
            start_time: start,
            end_time: start + chrono::Duration::hours(8),
            status: DutyStatus::Incomplete,
            comments: String::new(),
            assigned_at: start,
        };

        let doc = new_duty.to_document();
        assert!(doc.get("vehicleIds").is_none());

        let duty = Duty::from_document("new", &doc);
        assert_eq!(duty.officer_ids, new_duty.officer_ids);
        assert_eq!(duty.area, new_duty.area);
        assert_eq!(duty.end_time, Some(new_duty.end_time));
        assert_eq!(duty.status, Some(DutyStatus::Incomplete));
    }

    #[test]
    fn test_patch_fields() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
        let fields = DutyPatch::status(DutyStatus::Completed).to_fields(now);
        assert_eq!(fields.get("status"), Some(&json!("completed")));
        assert!(fields.get("comments").is_none());
        assert!(fields.contains_key("updatedAt"));
    }
}
