//! Request payloads for the mutating property operations.
//!
//! Payloads deliberately stay loose where the validation engine owns the
//! rules: `area`, `perimeter`, and `coordinates` arrive as raw JSON values
//! so that a non-numeric area is reported as a validation failure with a
//! field-specific reason instead of a body-level deserialization error.

use serde::Deserialize;
use serde_json::Value;

/// Body of `POST /properties`. Every field is optional at the type level;
/// the validator enforces which ones must be present.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct CreatePropertyPayload {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub area: Option<Value>,
    pub perimeter: Option<Value>,
    pub coordinates: Option<Value>,
}

/// Body of `PUT /properties/{id}`. Absent fields are left untouched;
/// a payload with none of the six mutable fields is rejected.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct UpdatePropertyPayload {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub area: Option<Value>,
    pub perimeter: Option<Value>,
    pub coordinates: Option<Value>,
}

impl UpdatePropertyPayload {
    /// True when the payload carries none of the mutable fields.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.kind.is_none()
            && self.description.is_none()
            && self.area.is_none()
            && self.perimeter.is_none()
            && self.coordinates.is_none()
    }
}

/// Body of `POST /properties/import`: up to 100 creation payloads, each
/// validated independently.
#[derive(Deserialize, Clone, Debug)]
pub struct ImportPayload {
    pub properties: Vec<Value>,
}

/// Body of `POST /properties/report`.
#[derive(Deserialize, Clone, Debug)]
pub struct ReportPayload {
    #[serde(rename = "propertyIds")]
    pub property_ids: Vec<String>,
}
