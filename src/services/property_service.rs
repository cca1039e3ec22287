//! src/services/property_service.rs
//!
//! PropertyService — owner-scoped CRUD and paginated query over the
//! backing store, plus the separate analysis-result lookup. All decimal
//! fields are persisted as TEXT and only translated to floats at the
//! response-formatting boundary. Every operation is a single bounded
//! request/response against SQLite; deletes are existence-conditioned and
//! updates go through one dynamic UPDATE statement rather than a local
//! read-modify-write round trip.

use crate::models::analysis::AnalysisResultRow;
use crate::models::payloads::UpdatePropertyPayload;
use crate::models::property::{Property, PropertyKind, PropertyRow, format_timestamp};
use crate::services::validation::{coordinates_from_value, decimal_from_value};
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Page size applied when the caller gives no limit or an out-of-range one.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Multi-row inserts are chunked to stay under SQLite's bind limit.
const BATCH_CHUNK: usize = 50;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("property `{0}` not found")]
    NotFound(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Query options for listing an owner's properties.
#[derive(Clone, Debug, Default)]
pub struct ListPropertiesParams {
    /// Applied to the page after retrieval; the continuation token always
    /// reflects the unfiltered scan position. Kept as the caller's raw
    /// string so a value outside the kind set matches nothing.
    pub kind: Option<String>,
    pub limit: Option<i64>,
    pub last_key: Option<String>,
}

#[derive(Debug)]
pub struct ListPropertiesResult {
    pub properties: Vec<Property>,
    pub next_key: Option<String>,
}

/// Validated, typed form of a partial update. Built from an
/// [`UpdatePropertyPayload`] after validation has passed; carries only the
/// fields the caller actually supplied.
#[derive(Clone, Debug, Default)]
pub struct PropertyPatch {
    pub name: Option<String>,
    pub kind: Option<PropertyKind>,
    pub description: Option<String>,
    pub area: Option<Decimal>,
    pub perimeter: Option<Decimal>,
    pub coordinates: Option<Vec<[Decimal; 2]>>,
}

impl PropertyPatch {
    /// Distill a validated payload into its stored forms. Returns `None`
    /// only if a field that passed validation fails to convert, which the
    /// handler treats as invalid input.
    pub fn from_payload(payload: &UpdatePropertyPayload) -> Option<Self> {
        let mut patch = PropertyPatch::default();
        if let Some(name) = payload.name.as_deref() {
            patch.name = Some(name.trim().to_string());
        }
        if let Some(kind) = payload.kind.as_deref() {
            patch.kind = Some(PropertyKind::parse(kind)?);
        }
        if let Some(description) = payload.description.as_deref() {
            patch.description = Some(description.to_string());
        }
        if let Some(area) = payload.area.as_ref() {
            patch.area = Some(decimal_from_value(area)?);
        }
        if let Some(perimeter) = payload.perimeter.as_ref() {
            patch.perimeter = Some(decimal_from_value(perimeter)?);
        }
        if let Some(coordinates) = payload.coordinates.as_ref() {
            patch.coordinates = Some(coordinates_from_value(coordinates)?);
        }
        Some(patch)
    }
}

/// Per-item outcome of a bulk insert.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub failed: usize,
}

/// Keyset cursor over `(created_at, property_id)`, serialized to JSON and
/// base64-encoded into the opaque `lastKey` token.
#[derive(Serialize, Deserialize, Debug)]
struct PageCursor {
    created_at: String,
    property_id: String,
}

const PROPERTY_COLUMNS: &str = "owner_id, property_id, name, kind, description, area, \
     perimeter, coordinates, analysis_status, created_at, updated_at";

#[derive(Clone)]
pub struct PropertyService {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl PropertyService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Unconditional upsert. Only ever called with freshly generated
    /// `property_id` values, so a key collision overwriting a record is
    /// treated as negligible and not checked.
    pub async fn put(&self, property: &Property) -> StoreResult<()> {
        let row = property.to_row();
        sqlx::query(
            r#"
            INSERT INTO properties (
                owner_id, property_id, name, kind, description, area,
                perimeter, coordinates, analysis_status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id, property_id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                description = excluded.description,
                area = excluded.area,
                perimeter = excluded.perimeter,
                coordinates = excluded.coordinates,
                analysis_status = excluded.analysis_status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.owner_id)
        .bind(&row.property_id)
        .bind(&row.name)
        .bind(&row.kind)
        .bind(&row.description)
        .bind(&row.area)
        .bind(&row.perimeter)
        .bind(&row.coordinates)
        .bind(&row.analysis_status)
        .bind(&row.created_at)
        .bind(&row.updated_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Point lookup scoped by owner. Absence is not an error.
    pub async fn get(&self, owner_id: &str, property_id: &str) -> StoreResult<Option<Property>> {
        let row: Option<PropertyRow> = sqlx::query_as(&format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties \
             WHERE owner_id = ? AND property_id = ?"
        ))
        .bind(owner_id)
        .bind(property_id)
        .fetch_optional(&*self.db)
        .await?;

        row.map(|r| Property::try_from(r).map_err(StoreError::Corrupt))
            .transpose()
    }

    /// List an owner's properties, newest first.
    ///
    /// Fetches `limit + 1` rows to detect truncation; the continuation
    /// token encodes the keyset position of the last returned row. A
    /// malformed token is ignored with a warning and the scan restarts
    /// from the beginning.
    pub async fn query(
        &self,
        owner_id: &str,
        params: ListPropertiesParams,
    ) -> StoreResult<ListPropertiesResult> {
        let limit = effective_limit(params.limit);
        let fetch_limit = limit + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties WHERE owner_id = "
        ));
        builder.push_bind(owner_id.to_string());

        if let Some(cursor) = params.last_key.as_deref().and_then(decode_cursor) {
            builder.push(" AND (created_at < ");
            builder.push_bind(cursor.created_at.clone());
            builder.push(" OR (created_at = ");
            builder.push_bind(cursor.created_at.clone());
            builder.push(" AND property_id < ");
            builder.push_bind(cursor.property_id.clone());
            builder.push("))");
        }

        builder.push(" ORDER BY created_at DESC, property_id DESC LIMIT ");
        builder.push_bind(fetch_limit);

        let mut rows: Vec<PropertyRow> = builder.build_query_as().fetch_all(&*self.db).await?;

        let truncated = rows.len() as i64 == fetch_limit;
        if truncated {
            rows.pop();
        }

        // The token must point at the last row of the unfiltered page.
        let next_key = if truncated {
            rows.last().map(|row| {
                encode_cursor(&PageCursor {
                    created_at: row.created_at.clone(),
                    property_id: row.property_id.clone(),
                })
            })
        } else {
            None
        };

        let mut properties = rows
            .into_iter()
            .map(Property::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Corrupt)?;

        if let Some(kind) = params.kind.as_deref() {
            properties.retain(|p| p.kind.as_str() == kind);
        }

        Ok(ListPropertiesResult {
            properties,
            next_key,
        })
    }

    /// Apply a partial update through a single dynamic UPDATE, refreshing
    /// `updated_at`, and return the merged record. Concurrent updates to
    /// different fields interleave safely; same-field updates are
    /// last-write-wins.
    pub async fn update(
        &self,
        owner_id: &str,
        property_id: &str,
        patch: &PropertyPatch,
    ) -> StoreResult<Property> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE properties SET updated_at = ");
        builder.push_bind(format_timestamp(Utc::now()));

        if let Some(name) = &patch.name {
            builder.push(", name = ");
            builder.push_bind(name.clone());
        }
        if let Some(kind) = patch.kind {
            builder.push(", kind = ");
            builder.push_bind(kind.as_str());
        }
        if let Some(description) = &patch.description {
            builder.push(", description = ");
            builder.push_bind(description.clone());
        }
        if let Some(area) = patch.area {
            builder.push(", area = ");
            builder.push_bind(area.to_string());
        }
        if let Some(perimeter) = patch.perimeter {
            builder.push(", perimeter = ");
            builder.push_bind(perimeter.to_string());
        }
        if let Some(coordinates) = &patch.coordinates {
            builder.push(", coordinates = ");
            builder.push_bind(serde_json::to_string(coordinates).unwrap_or_else(|_| "[]".into()));
        }

        builder.push(" WHERE owner_id = ");
        builder.push_bind(owner_id.to_string());
        builder.push(" AND property_id = ");
        builder.push_bind(property_id.to_string());
        builder.push(format!(" RETURNING {PROPERTY_COLUMNS}"));

        let row: Option<PropertyRow> = builder.build_query_as().fetch_optional(&*self.db).await?;
        match row {
            Some(row) => Property::try_from(row).map_err(StoreError::Corrupt),
            None => Err(StoreError::NotFound(property_id.to_string())),
        }
    }

    /// Existence-conditioned delete: succeeds only if a record with this
    /// exact key existed. A miss is reported distinctly from
    /// infrastructure errors.
    pub async fn delete(&self, owner_id: &str, property_id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM properties WHERE owner_id = ? AND property_id = ?")
            .bind(owner_id)
            .bind(property_id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(property_id.to_string()));
        }
        Ok(())
    }

    /// Insert a batch of records. Tries chunked multi-row inserts first;
    /// when a chunk fails, each of its items is retried individually and
    /// the outcome reports per-item success/failure counts instead of
    /// failing the whole batch.
    pub async fn batch_put(&self, properties: &[Property]) -> StoreResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for chunk in properties.chunks(BATCH_CHUNK) {
            let mut builder = QueryBuilder::<Sqlite>::new(
                "INSERT INTO properties (owner_id, property_id, name, kind, description, \
                 area, perimeter, coordinates, analysis_status, created_at, updated_at) ",
            );
            builder.push_values(chunk, |mut b, property| {
                let row = property.to_row();
                b.push_bind(row.owner_id)
                    .push_bind(row.property_id)
                    .push_bind(row.name)
                    .push_bind(row.kind)
                    .push_bind(row.description)
                    .push_bind(row.area)
                    .push_bind(row.perimeter)
                    .push_bind(row.coordinates)
                    .push_bind(row.analysis_status)
                    .push_bind(row.created_at)
                    .push_bind(row.updated_at);
            });

            match builder.build().execute(&*self.db).await {
                Ok(_) => outcome.inserted += chunk.len(),
                Err(err) => {
                    warn!("bulk insert failed, retrying items individually: {}", err);
                    for property in chunk {
                        match self.put(property).await {
                            Ok(_) => outcome.inserted += 1,
                            Err(err) => {
                                warn!(
                                    "failed to insert property {}: {}",
                                    property.property_id, err
                                );
                                outcome.failed += 1;
                            }
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Point lookup in the separate analysis-result store, addressed by
    /// `property_id` alone.
    pub async fn get_analysis(&self, property_id: &str) -> StoreResult<Option<AnalysisResultRow>> {
        let row = sqlx::query_as::<_, AnalysisResultRow>(
            "SELECT property_id, status, detail, updated_at \
             FROM analysis_results WHERE property_id = ?",
        )
        .bind(property_id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }
}

/// Clamp-or-reset: limits outside [1, MAX_PAGE_SIZE] silently fall back to
/// the default page size.
fn effective_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if (1..=MAX_PAGE_SIZE).contains(&l) => l,
        Some(_) | None => DEFAULT_PAGE_SIZE,
    }
}

fn encode_cursor(cursor: &PageCursor) -> String {
    let json = serde_json::to_string(cursor).unwrap_or_default();
    general_purpose::STANDARD.encode(json)
}

fn decode_cursor(token: &str) -> Option<PageCursor> {
    let decoded = general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|json| serde_json::from_str(&json).ok());
    if decoded.is_none() {
        warn!("ignoring malformed pagination token: {}", token);
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::property::{AnalysisStatus, generate_property_id};
    use chrono::{Duration, Utc};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_service() -> PropertyService {
        // A single connection keeps every query on the same in-memory DB.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        for stmt in include_str!("../../migrations/0001_init.sql")
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            sqlx::query(stmt).execute(&pool).await.expect("migration");
        }
        PropertyService::new(Arc::new(pool))
    }

    fn sample(owner: &str, name: &str, created_at: chrono::DateTime<Utc>) -> Property {
        // Stored precision is microseconds; keep the in-memory copy
        // comparable with what a read returns.
        let created_at = chrono::DateTime::parse_from_rfc3339(&format_timestamp(created_at))
            .unwrap()
            .with_timezone(&Utc);
        Property {
            owner_id: owner.into(),
            property_id: generate_property_id(),
            name: name.into(),
            kind: PropertyKind::Farm,
            description: String::new(),
            area: "120.5".parse().unwrap(),
            perimeter: "2000".parse().unwrap(),
            coordinates: vec![
                ["-50".parse().unwrap(), "-20".parse().unwrap()],
                ["-50.1".parse().unwrap(), "-20".parse().unwrap()],
                ["-50.1".parse().unwrap(), "-20.1".parse().unwrap()],
                ["-50".parse().unwrap(), "-20".parse().unwrap()],
            ],
            analysis_status: AnalysisStatus::Pending,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips_exact_decimals() {
        let service = test_service().await;
        let property = sample("owner-a", "Fazenda Sol", Utc::now());
        service.put(&property).await.unwrap();

        let fetched = service
            .get("owner-a", &property.property_id)
            .await
            .unwrap()
            .expect("stored record");
        assert_eq!(fetched.name, "Fazenda Sol");
        assert_eq!(fetched.area, property.area);
        assert_eq!(fetched.perimeter, property.perimeter);
        assert_eq!(fetched.coordinates, property.coordinates);
    }

    #[tokio::test]
    async fn get_is_owner_scoped() {
        let service = test_service().await;
        let property = sample("owner-a", "Fazenda Sol", Utc::now());
        service.put(&property).await.unwrap();

        let foreign = service
            .get("owner-b", &property.property_id)
            .await
            .unwrap();
        assert!(foreign.is_none());
    }

    #[tokio::test]
    async fn delete_of_missing_record_is_a_distinct_not_found() {
        let service = test_service().await;
        let err = service.delete("owner-a", "prop_000000000000").await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));

        let property = sample("owner-a", "Fazenda Sol", Utc::now());
        service.put(&property).await.unwrap();
        service
            .delete("owner-a", &property.property_id)
            .await
            .unwrap();
        assert!(
            service
                .get("owner-a", &property.property_id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn partial_update_preserves_untouched_fields() {
        let service = test_service().await;
        let property = sample("owner-a", "Fazenda Sol", Utc::now() - Duration::seconds(5));
        service.put(&property).await.unwrap();

        let patch = PropertyPatch {
            description: Some("rolling pasture".into()),
            ..Default::default()
        };
        let updated = service
            .update("owner-a", &property.property_id, &patch)
            .await
            .unwrap();

        assert_eq!(updated.description, "rolling pasture");
        assert_eq!(updated.name, property.name);
        assert_eq!(updated.area, property.area);
        assert_eq!(updated.perimeter, property.perimeter);
        assert_eq!(updated.coordinates, property.coordinates);
        assert_eq!(updated.created_at, property.created_at);
        assert!(updated.updated_at > property.updated_at);
    }

    #[tokio::test]
    async fn update_of_missing_record_is_not_found() {
        let service = test_service().await;
        let patch = PropertyPatch {
            name: Some("New Name".into()),
            ..Default::default()
        };
        let err = service.update("owner-a", "prop_000000000000", &patch).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn pagination_walks_newest_first_in_stable_pages() {
        let service = test_service().await;
        let base = Utc::now();
        for i in 0..5 {
            let property = sample(
                "owner-a",
                &format!("Property {}", i),
                base + Duration::seconds(i),
            );
            service.put(&property).await.unwrap();
        }

        let page1 = service
            .query(
                "owner-a",
                ListPropertiesParams {
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page1.properties.len(), 2);
        assert_eq!(page1.properties[0].name, "Property 4");
        assert_eq!(page1.properties[1].name, "Property 3");
        let token = page1.next_key.expect("continuation token");

        let page2 = service
            .query(
                "owner-a",
                ListPropertiesParams {
                    limit: Some(2),
                    last_key: Some(token),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page2.properties.len(), 2);
        assert_eq!(page2.properties[0].name, "Property 2");
        assert_eq!(page2.properties[1].name, "Property 1");

        let page3 = service
            .query(
                "owner-a",
                ListPropertiesParams {
                    limit: Some(2),
                    last_key: page2.next_key,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page3.properties.len(), 1);
        assert_eq!(page3.properties[0].name, "Property 0");
        assert!(page3.next_key.is_none());
    }

    #[tokio::test]
    async fn out_of_range_limits_silently_reset_to_the_default() {
        let service = test_service().await;
        for i in 0..5 {
            let property = sample(
                "owner-a",
                &format!("Property {}", i),
                Utc::now() + Duration::seconds(i),
            );
            service.put(&property).await.unwrap();
        }

        for bad_limit in [0, -3, 101] {
            let page = service
                .query(
                    "owner-a",
                    ListPropertiesParams {
                        limit: Some(bad_limit),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            assert_eq!(page.properties.len(), 5);
            assert!(page.next_key.is_none());
        }
    }

    #[tokio::test]
    async fn malformed_token_restarts_the_scan() {
        let service = test_service().await;
        let property = sample("owner-a", "Fazenda Sol", Utc::now());
        service.put(&property).await.unwrap();

        let page = service
            .query(
                "owner-a",
                ListPropertiesParams {
                    last_key: Some("%%% not base64 %%%".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.properties.len(), 1);
    }

    #[tokio::test]
    async fn kind_filter_applies_after_pagination() {
        let service = test_service().await;
        let base = Utc::now();
        for i in 0..4 {
            let mut property = sample(
                "owner-a",
                &format!("Property {}", i),
                base + Duration::seconds(i),
            );
            if i % 2 == 0 {
                property.kind = PropertyKind::Ranchette;
            }
            service.put(&property).await.unwrap();
        }

        // Page of 2 newest rows holds one ranchette; the filter shortens
        // the page but the token still reflects the unfiltered scan.
        let page = service
            .query(
                "owner-a",
                ListPropertiesParams {
                    kind: Some("ranchette".into()),
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.properties.len(), 1);
        assert!(page.next_key.is_some());
    }

    #[tokio::test]
    async fn batch_put_reports_per_item_counts() {
        let service = test_service().await;
        let properties: Vec<Property> = (0..3)
            .map(|i| sample("owner-a", &format!("Property {}", i), Utc::now()))
            .collect();

        let outcome = service.batch_put(&properties).await.unwrap();
        assert_eq!(
            outcome,
            BatchOutcome {
                inserted: 3,
                failed: 0
            }
        );

        let page = service
            .query("owner-a", ListPropertiesParams::default())
            .await
            .unwrap();
        assert_eq!(page.properties.len(), 3);
    }

    #[tokio::test]
    async fn analysis_lookup_returns_none_when_unreported() {
        let service = test_service().await;
        assert!(
            service
                .get_analysis("prop_000000000000")
                .await
                .unwrap()
                .is_none()
        );
    }
}
