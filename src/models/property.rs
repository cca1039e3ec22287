//! Represents a registered rural property and its stored form.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Closed set of property categories accepted by the registry.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Farm,
    Smallholding,
    Ranchette,
    VacantLot,
    Other,
}

impl PropertyKind {
    pub const ALL: [PropertyKind; 5] = [
        PropertyKind::Farm,
        PropertyKind::Smallholding,
        PropertyKind::Ranchette,
        PropertyKind::VacantLot,
        PropertyKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::Farm => "farm",
            PropertyKind::Smallholding => "smallholding",
            PropertyKind::Ranchette => "ranchette",
            PropertyKind::VacantLot => "vacant_lot",
            PropertyKind::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == value)
    }
}

impl Default for PropertyKind {
    fn default() -> Self {
        PropertyKind::Farm
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of the asynchronous geospatial analysis attached to a property.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(AnalysisStatus::Pending),
            "processing" => Some(AnalysisStatus::Processing),
            "completed" => Some(AnalysisStatus::Completed),
            "failed" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }
}

impl Default for AnalysisStatus {
    fn default() -> Self {
        AnalysisStatus::Pending
    }
}

/// A registered rural property.
///
/// Numeric fields are kept as exact decimals end to end; conversion to
/// floating point happens only when a record is formatted for a response.
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    /// Identity of the owning user (partition key). Opaque to the service.
    pub owner_id: String,

    /// Generated identifier, `prop_` plus 12 lowercase hex chars (sort key).
    pub property_id: String,

    /// Display name, 2-100 characters after trimming.
    pub name: String,

    /// Category of the property.
    pub kind: PropertyKind,

    /// Free-form description, up to 500 characters.
    pub description: String,

    /// Surface area in hectares, exact decimal.
    pub area: Decimal,

    /// Boundary perimeter in meters, exact decimal.
    pub perimeter: Decimal,

    /// Closed polygon ring as `[longitude, latitude]` pairs.
    pub coordinates: Vec<[Decimal; 2]>,

    /// State of the downstream geospatial analysis.
    pub analysis_status: AnalysisStatus,

    /// When the record was created. Immutable.
    pub created_at: DateTime<Utc>,

    /// Refreshed on every mutation. Never precedes `created_at`.
    pub updated_at: DateTime<Utc>,
}

/// Raw `properties` table row. Decimals and the coordinate ring are stored
/// as TEXT so repeated read-modify-write cycles cannot drift.
#[derive(FromRow, Clone, Debug)]
pub struct PropertyRow {
    pub owner_id: String,
    pub property_id: String,
    pub name: String,
    pub kind: String,
    pub description: String,
    pub area: String,
    pub perimeter: String,
    pub coordinates: String,
    pub analysis_status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Format a timestamp the way the store expects it: fixed-width RFC 3339
/// with microsecond precision, so lexicographic order matches time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Generate a fresh property identifier: `prop_` plus the first 12 hex
/// chars of a v4 UUID. The collision probability at that length is treated
/// as negligible and not checked.
pub fn generate_property_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("prop_{}", &hex[..12])
}

impl Property {
    pub fn to_row(&self) -> PropertyRow {
        PropertyRow {
            owner_id: self.owner_id.clone(),
            property_id: self.property_id.clone(),
            name: self.name.clone(),
            kind: self.kind.as_str().to_string(),
            description: self.description.clone(),
            area: self.area.to_string(),
            perimeter: self.perimeter.to_string(),
            // Decimal serializes as a string, keeping each component exact.
            coordinates: serde_json::to_string(&self.coordinates).unwrap_or_else(|_| "[]".into()),
            analysis_status: self.analysis_status.as_str().to_string(),
            created_at: format_timestamp(self.created_at),
            updated_at: format_timestamp(self.updated_at),
        }
    }
}

impl TryFrom<PropertyRow> for Property {
    type Error = String;

    fn try_from(row: PropertyRow) -> Result<Self, Self::Error> {
        let kind = PropertyKind::parse(&row.kind)
            .ok_or_else(|| format!("unknown property kind `{}`", row.kind))?;
        let analysis_status = AnalysisStatus::parse(&row.analysis_status)
            .ok_or_else(|| format!("unknown analysis status `{}`", row.analysis_status))?;
        let area = row
            .area
            .parse::<Decimal>()
            .map_err(|e| format!("bad area `{}`: {}", row.area, e))?;
        let perimeter = row
            .perimeter
            .parse::<Decimal>()
            .map_err(|e| format!("bad perimeter `{}`: {}", row.perimeter, e))?;
        let coordinates: Vec<[Decimal; 2]> = serde_json::from_str(&row.coordinates)
            .map_err(|e| format!("bad coordinate ring: {}", e))?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| format!("bad created_at `{}`: {}", row.created_at, e))?
            .with_timezone(&Utc);
        let updated_at = DateTime::parse_from_rfc3339(&row.updated_at)
            .map_err(|e| format!("bad updated_at `{}`: {}", row.updated_at, e))?
            .with_timezone(&Utc);

        Ok(Property {
            owner_id: row.owner_id,
            property_id: row.property_id,
            name: row.name,
            kind,
            description: row.description,
            area,
            perimeter,
            coordinates,
            analysis_status,
            created_at,
            updated_at,
        })
    }
}

/// Response-facing shape of a property. Decimals become floats here and
/// nowhere else.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PropertyResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    pub description: String,
    pub area: f64,
    pub perimeter: f64,
    pub coordinates: Vec<[f64; 2]>,
    pub analysis_status: AnalysisStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Property> for PropertyResponse {
    fn from(p: &Property) -> Self {
        PropertyResponse {
            id: p.property_id.clone(),
            name: p.name.clone(),
            kind: p.kind,
            description: p.description.clone(),
            area: p.area.to_f64().unwrap_or(0.0),
            perimeter: p.perimeter.to_f64().unwrap_or(0.0),
            coordinates: p
                .coordinates
                .iter()
                .map(|pair| {
                    [
                        pair[0].to_f64().unwrap_or(0.0),
                        pair[1].to_f64().unwrap_or(0.0),
                    ]
                })
                .collect(),
            analysis_status: p.analysis_status,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}
