//! HTTP Storage Backend Client
//!
//! JSON-over-HTTP implementation of the storage backend RPC contract. Each
//! call is bounded by the client-level request timeout; a timed-out or
//! unreachable call surfaces as a transport error scoped to its partition.

use crate::domain::ports::StorageBackendClient;
use crate::domain::volume::{BackendStatus, BackendVolumeStatus};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the HTTP backend client
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Per-request transport timeout
    pub request_timeout: Duration,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// Volume status as serialized by the storage backend
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireVolumeStatus {
    volume_id: String,
    status: String,
    #[serde(default)]
    size_gib: u32,
    #[serde(default)]
    device_name: Option<String>,
    #[serde(default)]
    snapshot_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<WireVolumeStatus> for BackendVolumeStatus {
    fn from(wire: WireVolumeStatus) -> Self {
        Self {
            volume_id: wire.volume_id,
            status: BackendStatus::parse(&wire.status),
            size_gib: wire.size_gib,
            device_name: wire.device_name,
            snapshot_id: wire.snapshot_id,
            created_at: wire.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireCreateVolume<'a> {
    volume_id: &'a str,
    size_gib: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_id: Option<&'a str>,
}

// =============================================================================
// HTTP Backend Client
// =============================================================================

/// Storage backend client speaking JSON over HTTP
pub struct HttpStorageBackend {
    client: reqwest::Client,
}

impl HttpStorageBackend {
    /// Build a client with the configured transport timeout
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client })
    }

    fn volumes_url(endpoint: &str) -> String {
        format!("{}/volumes", endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl StorageBackendClient for HttpStorageBackend {
    async fn describe_volumes(&self, endpoint: &str) -> Result<Vec<BackendVolumeStatus>> {
        let url = Self::volumes_url(endpoint);
        let statuses: Vec<WireVolumeStatus> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(endpoint = %endpoint, volumes = statuses.len(), "described volumes");
        Ok(statuses.into_iter().map(Into::into).collect())
    }

    async fn describe_volume(
        &self,
        endpoint: &str,
        volume_id: &str,
    ) -> Result<Option<BackendVolumeStatus>> {
        let url = format!("{}/{}", Self::volumes_url(endpoint), volume_id);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status: WireVolumeStatus = response.error_for_status()?.json().await?;
        Ok(Some(status.into()))
    }

    async fn create_volume(
        &self,
        endpoint: &str,
        volume_id: &str,
        size_gib: u32,
        snapshot_id: Option<&str>,
    ) -> Result<()> {
        let url = Self::volumes_url(endpoint);
        let response = self
            .client
            .post(&url)
            .json(&WireCreateVolume {
                volume_id,
                size_gib,
                snapshot_id,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let reason = response.text().await.unwrap_or_default();
            return Err(Error::BackendRejected {
                endpoint: endpoint.to_string(),
                reason: format!("{}: {}", status, reason),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_status_conversion() {
        let wire = WireVolumeStatus {
            volume_id: "vol-1".into(),
            status: "in-use".into(),
            size_gib: 16,
            device_name: Some("/dev/vg0/vol-1".into()),
            snapshot_id: None,
            created_at: None,
        };

        let status: BackendVolumeStatus = wire.into();
        assert_eq!(status.status, BackendStatus::InUse);
        assert_eq!(status.size_gib, 16);
        assert!(status.device_known());
    }

    #[test]
    fn test_wire_status_defaults() {
        let status: WireVolumeStatus =
            serde_json::from_str(r#"{"volume_id":"vol-1","status":"creating"}"#).unwrap();
        assert_eq!(status.size_gib, 0);
        assert!(status.device_name.is_none());

        let converted: BackendVolumeStatus = status.into();
        assert_eq!(converted.status, BackendStatus::Creating);
        assert!(!converted.device_known());
    }

    #[test]
    fn test_volumes_url_normalization() {
        assert_eq!(
            HttpStorageBackend::volumes_url("http://sc-a:8773/"),
            "http://sc-a:8773/volumes"
        );
        assert_eq!(
            HttpStorageBackend::volumes_url("http://sc-a:8773"),
            "http://sc-a:8773/volumes"
        );
    }

    #[test]
    fn test_create_volume_wire_shape() {
        let body = serde_json::to_string(&WireCreateVolume {
            volume_id: "vol-1",
            size_gib: 8,
            snapshot_id: None,
        })
        .unwrap();
        assert_eq!(body, r#"{"volume_id":"vol-1","size_gib":8}"#);
    }
}
