//! Result of the asynchronous geospatial analysis pipeline.
//!
//! Analysis runs outside this service. Results land in a separate table
//! keyed by `property_id` alone and are polled synchronously by the
//! analysis-fetch route.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::models::property::AnalysisStatus;

/// Raw `analysis_results` table row.
#[derive(FromRow, Clone, Debug)]
pub struct AnalysisResultRow {
    pub property_id: String,
    pub status: String,
    /// JSON payload produced by the analysis worker, if any.
    pub detail: Option<String>,
    pub updated_at: String,
}

/// Response-facing shape of an analysis result.
///
/// A property with no stored result is reported as `pending` with the
/// optional fields absent.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub property_id: String,
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AnalysisResponse {
    /// The default answer when no analysis result has been stored yet.
    pub fn pending(property_id: &str) -> Self {
        AnalysisResponse {
            property_id: property_id.to_string(),
            status: AnalysisStatus::Pending,
            result: None,
            updated_at: None,
        }
    }
}

impl TryFrom<AnalysisResultRow> for AnalysisResponse {
    type Error = String;

    fn try_from(row: AnalysisResultRow) -> Result<Self, Self::Error> {
        let status = AnalysisStatus::parse(&row.status)
            .ok_or_else(|| format!("unknown analysis status `{}`", row.status))?;
        let updated_at = DateTime::parse_from_rfc3339(&row.updated_at)
            .map_err(|e| format!("bad updated_at `{}`: {}", row.updated_at, e))?
            .with_timezone(&Utc);
        // A detail blob that is not valid JSON is passed through as a string.
        let result = row.detail.map(|detail| {
            serde_json::from_str(&detail).unwrap_or(serde_json::Value::String(detail))
        });

        Ok(AnalysisResponse {
            property_id: row.property_id,
            status,
            result,
            updated_at: Some(updated_at),
        })
    }
}
