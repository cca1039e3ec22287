//! HTTP handlers for the property registry routes.
//!
//! Handlers stay thin: resolve the caller identity, parse and validate the
//! payload, check ownership for id-bearing routes, then delegate to
//! `PropertyService` and format the response envelope. No handler keeps
//! state between invocations.

use crate::{
    AppState,
    errors::AppError,
    models::{
        analysis::AnalysisResponse,
        payloads::{CreatePropertyPayload, ImportPayload, ReportPayload, UpdatePropertyPayload},
        property::{
            AnalysisStatus, Property, PropertyKind, PropertyResponse, generate_property_id,
        },
    },
    services::{
        property_service::{ListPropertiesParams, PropertyPatch},
        report_service, stats_service,
        validation::{self, ValidationError},
    },
};
use axum::{
    Json,
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{Method, StatusCode, Uri, request::Parts},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

/// Header carrying the identity resolved by the upstream authorizer.
pub const IDENTITY_HEADER: &str = "x-user-id";

/// Bulk import is capped at this many items per request.
pub const MAX_IMPORT_ITEMS: usize = 100;

/// Per-item import failures are truncated to this many in the response.
const MAX_REPORTED_IMPORT_ERRORS: usize = 10;

/// Caller identity, already resolved by the authentication layer and
/// delivered as an opaque identifier. Absence terminates the request with
/// 401 before any handler logic runs.
pub struct Identity(pub String);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(IDENTITY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Identity(value.to_string()))
            .ok_or_else(AppError::unauthorized)
    }
}

/// Query params accepted by the list route.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Kept as a raw string; an unparseable value falls back to the
    /// default page size instead of failing the request.
    pub limit: Option<String>,
    #[serde(rename = "lastKey")]
    pub last_key: Option<String>,
}

/// `POST /properties` — validate, persist, and announce a new property.
pub async fn create_property(
    State(state): State<AppState>,
    identity: Identity,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: CreatePropertyPayload = parse_body(&body)?;
    validation::validate_create(&payload)?;

    let property = build_property(&identity.0, &payload)?;
    state.store.put(&property).await?;
    info!(
        "created property {} for owner {}...",
        property.property_id,
        owner_prefix(&identity.0)
    );

    // Best-effort: a sink failure never rolls back the committed record.
    state.events.publish_created(&property).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Property created successfully",
            "property": PropertyResponse::from(&property),
        })),
    )
        .into_response())
}

/// `GET /properties` — list one page of the owner's properties, newest
/// first, with page-local statistics when the page is non-empty.
pub async fn list_properties(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let params = ListPropertiesParams {
        kind: query.kind,
        limit: query.limit.as_deref().and_then(|v| v.parse::<i64>().ok()),
        last_key: query.last_key,
    };

    let result = state.store.query(&identity.0, params).await?;
    let formatted: Vec<PropertyResponse> = result.properties.iter().map(Into::into).collect();
    info!(
        "returning {} properties for owner {}...",
        formatted.len(),
        owner_prefix(&identity.0)
    );

    let mut body = json!({
        "properties": formatted,
        "count": formatted.len(),
        "lastKey": result.next_key,
    });
    if !result.properties.is_empty() {
        let stats = stats_service::aggregate(&result.properties);
        body["statistics"] = serde_json::to_value(stats)
            .map_err(|err| AppError::internal(format!("serializing statistics: {}", err)))?;
    }

    Ok(Json(body).into_response())
}

/// `PUT /properties/{id}` — partial update of an owned property.
pub async fn update_property(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: UpdatePropertyPayload = parse_body(&body)?;

    // Ownership check before any mutation is attempted.
    state
        .store
        .get(&identity.0, &id)
        .await?
        .ok_or_else(|| AppError::not_found("Property not found"))?;

    validation::validate_update(&payload)?;
    let patch = PropertyPatch::from_payload(&payload)
        .ok_or_else(|| AppError::internal("validated payload failed conversion"))?;

    let updated = state.store.update(&identity.0, &id, &patch).await?;
    info!(
        "updated property {} for owner {}...",
        id,
        owner_prefix(&identity.0)
    );

    Ok(Json(json!({
        "message": "Property updated successfully",
        "property": PropertyResponse::from(&updated),
    }))
    .into_response())
}

/// `DELETE /properties/{id}` — existence-conditioned physical delete.
pub async fn delete_property(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let existing = state
        .store
        .get(&identity.0, &id)
        .await?
        .ok_or_else(|| AppError::not_found("Property not found"))?;

    // The conditioned delete still reports 404 if a concurrent caller won.
    state.store.delete(&identity.0, &id).await?;
    info!(
        "deleted property {} for owner {}...",
        id,
        owner_prefix(&identity.0)
    );

    Ok(Json(json!({
        "message": "Property deleted successfully",
        "deletedProperty": {
            "id": existing.property_id,
            "name": existing.name,
        },
    }))
    .into_response())
}

/// `GET /properties/{id}/analysis` — poll the asynchronous analysis
/// result, defaulting to `pending` when none has been stored yet.
pub async fn fetch_analysis(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let property = state
        .store
        .get(&identity.0, &id)
        .await?
        .ok_or_else(|| AppError::not_found("Property not found"))?;

    let response = match state.store.get_analysis(&property.property_id).await? {
        Some(row) => AnalysisResponse::try_from(row)
            .map_err(|err| AppError::internal(format!("corrupt analysis result: {}", err)))?,
        None => AnalysisResponse::pending(&property.property_id),
    };

    Ok(Json(response).into_response())
}

/// `POST /properties/import` — bulk create of up to 100 items. Items are
/// validated independently; per-item failures never abort the batch.
pub async fn import_properties(
    State(state): State<AppState>,
    identity: Identity,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: ImportPayload = parse_body(&body)?;
    if payload.properties.len() > MAX_IMPORT_ITEMS {
        return Err(AppError::bad_request(format!(
            "Import is limited to {} properties per request",
            MAX_IMPORT_ITEMS
        )));
    }

    let mut valid = Vec::new();
    let mut errors = Vec::new();
    for (index, item) in payload.properties.iter().enumerate() {
        let item_payload = match serde_json::from_value::<CreatePropertyPayload>(item.clone()) {
            Ok(p) => p,
            Err(_) => {
                errors.push(json!({"index": index, "error": "invalid property payload"}));
                continue;
            }
        };
        if let Err(err) = validation::validate_create(&item_payload) {
            errors.push(json!({"index": index, "error": err.to_string()}));
            continue;
        }
        match build_property(&identity.0, &item_payload) {
            Ok(property) => valid.push(property),
            Err(_) => errors.push(json!({"index": index, "error": "invalid property payload"})),
        }
    }

    let outcome = if valid.is_empty() {
        Default::default()
    } else {
        state.store.batch_put(&valid).await?
    };
    for property in &valid {
        state.events.publish_created(property).await;
    }
    info!(
        "imported {} of {} properties for owner {}...",
        outcome.inserted,
        payload.properties.len(),
        owner_prefix(&identity.0)
    );

    let failed = errors.len() + outcome.failed;
    errors.truncate(MAX_REPORTED_IMPORT_ERRORS);

    Ok(Json(json!({
        "imported": outcome.inserted,
        "failed": failed,
        "errors": errors,
    }))
    .into_response())
}

/// `POST /properties/report` — render a PDF summary over the requested
/// ids. Unknown or foreign ids are skipped; an empty resulting set fails.
pub async fn generate_report(
    State(state): State<AppState>,
    identity: Identity,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: ReportPayload = parse_body(&body)?;

    let mut properties = Vec::new();
    for id in &payload.property_ids {
        match state.store.get(&identity.0, id).await? {
            Some(property) => properties.push(property),
            None => debug!("skipping unknown property {} in report", id),
        }
    }
    if properties.is_empty() {
        return Err(AppError::not_found("No properties found for report"));
    }

    let stats = stats_service::aggregate(&properties);
    let pdf = report_service::render_summary(&properties, &stats)
        .map_err(|err| AppError::internal(format!("report rendering failed: {}", err)))?;

    Ok(Json(json!({
        "report": general_purpose::STANDARD.encode(&pdf),
        "contentType": "application/pdf",
        "propertyCount": properties.len(),
    }))
    .into_response())
}

/// Fallback for unknown routes and method mismatches: OPTIONS answers the
/// CORS preflight, everything else echoes the method and path in a 404.
pub async fn unmatched_route(method: Method, uri: Uri) -> Response {
    if method == Method::OPTIONS {
        return (StatusCode::OK, Json(json!({"message": "CORS preflight"}))).into_response();
    }
    AppError::not_found(format!("Endpoint not found: {} {}", method, uri.path())).into_response()
}

/// Parse a JSON body, mapping any failure to a client error before
/// validation gets a chance to run.
fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|_| AppError::bad_request("Invalid JSON body"))
}

/// Assemble a full record from a payload that already passed validation.
fn build_property(owner_id: &str, payload: &CreatePropertyPayload) -> Result<Property, AppError> {
    let area = payload
        .area
        .as_ref()
        .and_then(validation::decimal_from_value)
        .ok_or(ValidationError::InvalidNumber("area"))?;
    let perimeter = payload
        .perimeter
        .as_ref()
        .and_then(validation::decimal_from_value)
        .ok_or(ValidationError::InvalidNumber("perimeter"))?;
    let coordinates = payload
        .coordinates
        .as_ref()
        .and_then(validation::coordinates_from_value)
        .ok_or(ValidationError::InvalidGeometry)?;
    let kind = payload
        .kind
        .as_deref()
        .and_then(PropertyKind::parse)
        .unwrap_or_default();
    let now = Utc::now();

    Ok(Property {
        owner_id: owner_id.to_string(),
        property_id: generate_property_id(),
        name: payload.name.as_deref().unwrap_or_default().trim().to_string(),
        kind,
        description: payload.description.clone().unwrap_or_default(),
        area,
        perimeter,
        coordinates,
        analysis_status: AnalysisStatus::Pending,
        created_at: now,
        updated_at: now,
    })
}

/// Owner identifiers are opaque and potentially sensitive; logs only ever
/// carry a short prefix.
fn owner_prefix(owner_id: &str) -> &str {
    owner_id.get(..8).unwrap_or(owner_id)
}
