//! Validation engine for property payloads.
//!
//! Pure functions over the loose request payloads. Checks run in a fixed
//! order (required fields, name, area, perimeter, coordinates, type,
//! description) and the first failure wins; errors are never aggregated.
//! Geometry validation is a single boolean: callers cannot tell which
//! polygon rule failed, and every geometry problem surfaces as the same
//! generic message.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde_json::Value;
use thiserror::Error;

use crate::models::payloads::{CreatePropertyPayload, UpdatePropertyPayload};
use crate::models::property::PropertyKind;

/// Largest accepted area, in hectares.
pub const MAX_AREA: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Maximum description length, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// A polygon ring needs three distinct vertices plus the repeated closing one.
pub const MIN_RING_POINTS: usize = 4;

/// Discriminated validation failure. `Display` strings are the reasons
/// returned verbatim in 400 responses.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("name must be between 2 and 100 characters")]
    InvalidName,
    #[error("{0} must be a valid number")]
    InvalidNumber(&'static str),
    #[error("{0} is outside the accepted range")]
    OutOfRange(&'static str),
    #[error("coordinates are not a valid closed polygon")]
    InvalidGeometry,
    #[error("type must be one of: farm, smallholding, ranchette, vacant_lot, other")]
    InvalidKind,
    #[error("description must be at most 500 characters")]
    DescriptionTooLong,
    #[error("at least one updatable field must be provided")]
    EmptyUpdate,
}

/// Validate a creation payload. All four of `name`, `area`, `perimeter`,
/// and `coordinates` must be present; `type` and `description` are
/// optional but checked when given.
pub fn validate_create(payload: &CreatePropertyPayload) -> Result<(), ValidationError> {
    if payload.name.is_none() {
        return Err(ValidationError::MissingField("name"));
    }
    if payload.area.is_none() {
        return Err(ValidationError::MissingField("area"));
    }
    if payload.perimeter.is_none() {
        return Err(ValidationError::MissingField("perimeter"));
    }
    if payload.coordinates.is_none() {
        return Err(ValidationError::MissingField("coordinates"));
    }

    check_name(payload.name.as_deref().unwrap_or_default())?;
    check_area(payload.area.as_ref().unwrap_or(&Value::Null))?;
    check_perimeter(payload.perimeter.as_ref().unwrap_or(&Value::Null))?;
    if !validate_geometry(payload.coordinates.as_ref().unwrap_or(&Value::Null)) {
        return Err(ValidationError::InvalidGeometry);
    }
    if let Some(kind) = payload.kind.as_deref() {
        check_kind(kind)?;
    }
    if let Some(description) = payload.description.as_deref() {
        check_description(description)?;
    }

    Ok(())
}

/// Validate a partial-update payload. Absent fields are not an error, but
/// at least one of the six mutable fields must be present. Fields that are
/// present obey the same rules as at creation, in the same order.
pub fn validate_update(payload: &UpdatePropertyPayload) -> Result<(), ValidationError> {
    if payload.is_empty() {
        return Err(ValidationError::EmptyUpdate);
    }

    if let Some(name) = payload.name.as_deref() {
        check_name(name)?;
    }
    if let Some(area) = payload.area.as_ref() {
        check_area(area)?;
    }
    if let Some(perimeter) = payload.perimeter.as_ref() {
        check_perimeter(perimeter)?;
    }
    if let Some(coordinates) = payload.coordinates.as_ref() {
        if !validate_geometry(coordinates) {
            return Err(ValidationError::InvalidGeometry);
        }
    }
    if let Some(kind) = payload.kind.as_deref() {
        check_kind(kind)?;
    }
    if let Some(description) = payload.description.as_deref() {
        check_description(description)?;
    }

    Ok(())
}

/// Check a polygon ring: a JSON array of at least four `[longitude,
/// latitude]` pairs within world bounds, with the first point equal to the
/// last. Returns a bare boolean; there is no partial-success mode.
pub fn validate_geometry(coordinates: &Value) -> bool {
    let Some(points) = coordinates.as_array() else {
        return false;
    };
    if points.len() < MIN_RING_POINTS {
        return false;
    }

    let mut parsed: Vec<[f64; 2]> = Vec::with_capacity(points.len());
    for point in points {
        let Some(pair) = point.as_array() else {
            return false;
        };
        if pair.len() != 2 {
            return false;
        }
        let (Some(lon), Some(lat)) = (lenient_f64(&pair[0]), lenient_f64(&pair[1])) else {
            return false;
        };
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return false;
        }
        parsed.push([lon, lat]);
    }

    parsed.first() == parsed.last()
}

fn check_name(name: &str) -> Result<(), ValidationError> {
    let len = name.trim().chars().count();
    if len < 2 || len > 100 {
        return Err(ValidationError::InvalidName);
    }
    Ok(())
}

fn check_area(value: &Value) -> Result<(), ValidationError> {
    let area = decimal_from_value(value).ok_or(ValidationError::InvalidNumber("area"))?;
    if area <= Decimal::ZERO || area > MAX_AREA {
        return Err(ValidationError::OutOfRange("area"));
    }
    Ok(())
}

fn check_perimeter(value: &Value) -> Result<(), ValidationError> {
    let perimeter = decimal_from_value(value).ok_or(ValidationError::InvalidNumber("perimeter"))?;
    if perimeter <= Decimal::ZERO {
        return Err(ValidationError::OutOfRange("perimeter"));
    }
    Ok(())
}

fn check_kind(kind: &str) -> Result<(), ValidationError> {
    PropertyKind::parse(kind)
        .map(|_| ())
        .ok_or(ValidationError::InvalidKind)
}

fn check_description(description: &str) -> Result<(), ValidationError> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::DescriptionTooLong);
    }
    Ok(())
}

/// Convert a raw JSON value into an exact decimal. Integers convert
/// losslessly; floats go through the closest-decimal conversion; numeric
/// strings are accepted. Everything else is rejected.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else if let Some(u) = n.as_u64() {
                Some(Decimal::from(u))
            } else {
                n.as_f64().and_then(Decimal::from_f64)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            s.parse::<Decimal>()
                .ok()
                .or_else(|| Decimal::from_scientific(s).ok())
        }
        _ => None,
    }
}

/// Convert an already-validated polygon ring into its exact-decimal stored
/// form. Returns `None` if any component fails to convert, which callers
/// treat as invalid geometry.
pub fn coordinates_from_value(coordinates: &Value) -> Option<Vec<[Decimal; 2]>> {
    let points = coordinates.as_array()?;
    let mut ring = Vec::with_capacity(points.len());
    for point in points {
        let pair = point.as_array()?;
        if pair.len() != 2 {
            return None;
        }
        ring.push([coordinate_decimal(&pair[0])?, coordinate_decimal(&pair[1])?]);
    }
    Some(ring)
}

/// A ring component that passed geometry validation always converts: exact
/// parsing first, with the float path as a fallback.
fn coordinate_decimal(value: &Value) -> Option<Decimal> {
    decimal_from_value(value).or_else(|| lenient_f64(value).and_then(Decimal::from_f64))
}

fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
