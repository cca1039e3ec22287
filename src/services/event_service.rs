//! Best-effort publication of property-creation events.
//!
//! Downstream geospatial analysis consumes these events asynchronously.
//! The sink is a newline-delimited JSON file named by configuration; when
//! no sink is configured, publication is a no-op. Failures are logged and
//! swallowed: they never surface to the caller and never roll back the
//! already-committed record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::models::property::Property;

/// Event emitted when a property record has been committed.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PropertyCreatedEvent<'a> {
    event: &'static str,
    property_id: &'a str,
    owner_id: &'a str,
    coordinates: &'a [[Decimal; 2]],
    status: &'a str,
    timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct EventPublisher {
    sink: Option<PathBuf>,
}

impl EventPublisher {
    pub fn new(sink: Option<String>) -> Self {
        Self {
            sink: sink.map(PathBuf::from),
        }
    }

    /// Publish a creation event for an already-committed record.
    pub async fn publish_created(&self, property: &Property) {
        let Some(path) = &self.sink else {
            debug!("no event sink configured, skipping publish");
            return;
        };

        let event = PropertyCreatedEvent {
            event: "property.created",
            property_id: &property.property_id,
            owner_id: &property.owner_id,
            coordinates: &property.coordinates,
            status: property.analysis_status.as_str(),
            timestamp: Utc::now(),
        };

        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(err) => {
                warn!("failed to serialize creation event: {}", err);
                return;
            }
        };

        if let Err(err) = append_line(path, &line).await {
            warn!(
                "failed to publish creation event for {}: {}",
                property.property_id, err
            );
        }
    }
}

async fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::property::{AnalysisStatus, PropertyKind, generate_property_id};

    fn sample() -> Property {
        Property {
            owner_id: "owner-a".into(),
            property_id: generate_property_id(),
            name: "Fazenda Sol".into(),
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn appends_one_json_line_per_event() {
        let path = std::env::temp_dir().join(format!("events-{}.jsonl", uuid::Uuid::new_v4()));
        let publisher = EventPublisher::new(Some(path.to_string_lossy().into_owned()));
        let property = sample();

        publisher.publish_created(&property).await;
        publisher.publish_created(&property).await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let event: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(event["event"], "property.created");
        assert_eq!(event["propertyId"], property.property_id.as_str());
        assert_eq!(event["ownerId"], "owner-a");
        assert_eq!(event["status"], "pending");

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn without_a_sink_publication_is_a_no_op() {
        let publisher = EventPublisher::new(None);
        // Must not panic or create any file.
        publisher.publish_created(&sample()).await;
    }
}
