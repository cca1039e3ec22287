//! Defines routes for the rural-property registry API.
//!
//! ## Structure
//! - **Collection endpoints**
//!   - `POST   /properties` — create a property
//!   - `GET    /properties` — list one page (supports type, limit, lastKey)
//!   - `POST   /properties/import` — bulk create, up to 100 items
//!   - `POST   /properties/report` — PDF summary over selected ids
//!
//! - **Record endpoints**
//!   - `PUT    /properties/{id}` — partial update
//!   - `DELETE /properties/{id}` — delete
//!   - `GET    /properties/{id}/analysis` — poll the async analysis result
//!
//! Anything else falls through to the echo handler: OPTIONS answers the
//! CORS preflight, other unmatched requests get a 404 naming the method
//! and path. Every response carries the fixed CORS headers.

use crate::{
    AppState,
    handlers::{
        health_handlers::{healthz, readyz},
        property_handlers::{
            create_property, delete_property, fetch_analysis, generate_report, import_properties,
            list_properties, unmatched_route, update_property,
        },
    },
};
use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, header},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};

/// Build and return the router for all registry routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Collection routes
        .route("/properties", post(create_property).get(list_properties))
        .route("/properties/import", post(import_properties))
        .route("/properties/report", post(generate_report))
        // Record routes
        .route(
            "/properties/{id}",
            put(update_property).delete(delete_property),
        )
        .route("/properties/{id}/analysis", get(fetch_analysis))
        .fallback(unmatched_route)
        .method_not_allowed_fallback(unmatched_route)
        .layer(middleware::from_fn(cors_headers))
}

/// Fixed CORS headers attached to every response, preflight included.
async fn cors_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type,Authorization,X-Api-Key,X-User-Id,Date"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,POST,PUT,DELETE,OPTIONS"),
    );
    response
}
