use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// An officer on the roster. Stored documents use the `staff_*` field names;
/// the camelCase spellings are accepted too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Officer {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "staff_id", alias = "staffId", default, deserialize_with = "lenient_string")]
    pub staff_id: String,
    #[serde(rename = "staff_name", alias = "name", default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "staff_designation", alias = "designation", default, deserialize_with = "lenient_string")]
    pub designation: String,
    #[serde(
        rename = "staff_nature_of_work",
        alias = "natureOfWork",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "String::is_empty"
    )]
    pub nature_of_work: String,
}

impl Officer {
    /// Decodes a roster document, using the document key when the body
    /// carries no `id` of its own. Returns `None` for documents that are not
    /// objects.
    pub fn from_document(id: &str, doc: &JsonValue) -> Option<Self> {
        let mut officer: Officer = serde_json::from_value(doc.clone()).ok()?;
        if officer.id.trim().is_empty() {
            officer.id = id.to_string();
        }
        Some(officer)
    }

    pub fn is_available(&self) -> bool {
        let work = self.nature_of_work.to_lowercase();
        !work.contains("absent") && !work.contains("leave")
    }

    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        [&self.name, &self.staff_id, &self.designation]
            .iter()
            .any(|field| field.to_lowercase().contains(&term))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "vehicle_name", alias = "name", default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Vehicle {
    pub fn from_document(id: &str, doc: &JsonValue) -> Option<Self> {
        let mut vehicle: Vehicle = serde_json::from_value(doc.clone()).ok()?;
        if vehicle.id.trim().is_empty() {
            vehicle.id = id.to_string();
        }
        Some(vehicle)
    }

    pub fn is_available(&self) -> bool {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(status) => status.eq_ignore_ascii_case("available"),
        }
    }
}

/// Accepts strings, numbers and booleans for text fields; anything else reads
/// as empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(match value {
        JsonValue::String(s) => s,
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}
