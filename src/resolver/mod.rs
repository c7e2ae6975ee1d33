//! Officer and vehicle resolution for duty records.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::utils::{Officer, Vehicle};

const PLACEHOLDER: &str = "-";

/// Keys tried, in order, when an id list element is an object.
const WRAPPED_ID_KEYS: [&str; 3] = ["id", "uid", "value"];

/// Flattens whatever a duty document carries for its assignees into a list
/// of trimmed, non-empty ids.
///
/// Accepts a missing/null value, a single scalar, a single wrapped object, or
/// an array mixing scalars and `{id | uid | value}` objects.
pub fn normalize_ids(raw: &JsonValue) -> Vec<String> {
    let entries: &[JsonValue] = match raw {
        JsonValue::Null => return Vec::new(),
        JsonValue::Array(items) => items.as_slice(),
        single => std::slice::from_ref(single),
    };

    entries
        .iter()
        .filter_map(id_of)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

fn id_of(entry: &JsonValue) -> Option<String> {
    match entry {
        JsonValue::Object(obj) => WRAPPED_ID_KEYS
            .iter()
            .filter_map(|key| obj.get(*key))
            .find(|v| !v.is_null())
            .and_then(scalar_text),
        other => scalar_text(other),
    }
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficerSummary {
    pub name: String,
    pub designation: String,
    pub staff_id: String,
}

fn or_fallback(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn join_non_blank<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn officer_count_label(n: usize) -> String {
    if n == 1 {
        "1 Officer".to_string()
    } else {
        format!("{} Officers", n)
    }
}

/// Officers from `roster` assigned by `ids`: matched on the internal id, or
/// on the staff id when nothing matches internally.
pub fn matching_officers<'a>(ids: &[String], roster: &'a [Officer]) -> Vec<&'a Officer> {
    let wanted = |candidate: &str| {
        let candidate = candidate.trim();
        !candidate.is_empty() && ids.iter().any(|id| id.trim() == candidate)
    };

    let by_id: Vec<&Officer> = roster.iter().filter(|o| wanted(&o.id)).collect();
    if !by_id.is_empty() {
        return by_id;
    }

    roster.iter().filter(|o| wanted(&o.staff_id)).collect()
}

pub fn resolve(ids: &[String], roster: &[Officer]) -> OfficerSummary {
    let matched = matching_officers(ids, roster);

    match matched.as_slice() {
        [] if ids.is_empty() => OfficerSummary {
            name: "Unassigned".to_string(),
            designation: PLACEHOLDER.to_string(),
            staff_id: PLACEHOLDER.to_string(),
        },
        [] => OfficerSummary {
            name: officer_count_label(ids.len()),
            designation: "Assigned".to_string(),
            staff_id: ids.join(", "),
        },
        [officer] => OfficerSummary {
            name: or_fallback(&officer.name, "Unknown Officer"),
            designation: or_fallback(&officer.designation, "Unknown"),
            staff_id: or_fallback(&officer.staff_id, "Unknown"),
        },
        many => OfficerSummary {
            name: format!("{} Officers", many.len()),
            designation: join_non_blank(many.iter().map(|o| o.designation.as_str())),
            staff_id: join_non_blank(many.iter().map(|o| o.staff_id.as_str())),
        },
    }
}

pub fn available_officers(roster: &[Officer]) -> Vec<&Officer> {
    roster.iter().filter(|o| o.is_available()).collect()
}

pub fn search_officers<'a>(roster: &'a [Officer], term: &str) -> Vec<&'a Officer> {
    roster.iter().filter(|o| o.matches_search(term)).collect()
}

pub fn available_vehicles(vehicles: &[Vehicle]) -> Vec<&Vehicle> {
    vehicles.iter().filter(|v| v.is_available()).collect()
}

/// Vehicle names for `ids`, falling back to the raw id for vehicles that are
/// no longer on the roster.
pub fn resolve_vehicles(ids: &[String], vehicles: &[Vehicle]) -> Vec<String> {
    ids.iter()
        .map(|id| {
            vehicles
                .iter()
                .find(|v| v.id.trim() == id)
                .map(|v| or_fallback(&v.name, id))
                .unwrap_or_else(|| id.clone())
        })
        .collect()
}
