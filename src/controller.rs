//! ==============================================================================
//! controller.rs - read-only client for the grow controller
//! ==============================================================================
//!
//! purpose:
//!     fetches the two pieces of state the annotation needs:
//!     - the grow database (registry of grow systems)
//!     - the current sensor snapshot
//!
//! wire format (json over http):
//!
//! ```text
//!     GET /api/grow-database
//!         { "statusCode": "OPERATION_OK", "newGrowDatabase": [ ...systems ] }
//!
//!     GET /api/sensor-snapshot
//!         { "moduleStatus": "CONNECTED",
//!           "sensorData": [ ...reading sets ],
//!           "displayParameters": [ ...display metadata ] }
//! ```
//!
//! credentials:
//!     when a passphrase is configured, every request carries
//!     `x-auth-key: hex(sha256(passphrase))`.
//!
//! validation:
//!     a snapshot with repeated sensor ids or reading names is rejected as
//!     malformed, same as a registry with repeated grow system ids.
//!
//! relationships:
//!     - used by: annotation.rs (through the ControllerApi trait)
//!     - produces: domain::GrowSystemRegistry, domain::SensorSnapshot
//!
//! ==============================================================================

use crate::config::ServerConfig;
use crate::domain::{
    GrowSystem, GrowSystemRegistry, SensorDisplayMetadata, SensorReadingSet, SensorSnapshot,
};

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;

pub const AUTH_HEADER_KEY: &str = "x-auth-key";

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("controller unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("controller reported status {0}")]
    Status(String),
    #[error("malformed controller data: {0}")]
    Malformed(String),
}

/// the two read-only controller operations the snapper consumes
#[async_trait]
pub trait ControllerApi: Send + Sync {
    /// succeeds only when the controller reports OPERATION_OK
    async fn get_grow_database(&self) -> Result<GrowSystemRegistry, ControllerError>;

    /// succeeds only when the sensor module reports CONNECTED
    async fn get_sensor_snapshot(&self) -> Result<SensorSnapshot, ControllerError>;
}

// ==============================================================================
// wire types
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrowDatabaseStatus {
    OperationOk,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorModuleStatus {
    Connected,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrowDatabaseResponse {
    status_code: GrowDatabaseStatus,
    #[serde(default)]
    new_grow_database: Option<Vec<GrowSystem>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SensorSnapshotResponse {
    module_status: SensorModuleStatus,
    #[serde(default)]
    sensor_data: Vec<SensorReadingSet>,
    #[serde(default)]
    display_parameters: Vec<SensorDisplayMetadata>,
}

// ==============================================================================
// http client
// ==============================================================================

pub struct HttpController {
    client: reqwest::Client,
    base_url: String,
    auth_key: Option<String>,
}

impl HttpController {
    pub fn new(server: &ServerConfig) -> Result<Self, ControllerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(server.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("http://{}:{}", server.host_name, server.port_number),
            auth_key: server.server_passphrase.as_deref().map(hash_passphrase),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match &self.auth_key {
            Some(key) => request.header(AUTH_HEADER_KEY, key),
            None => request,
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ControllerError> {
        let response = self.get(path).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ControllerError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ControllerApi for HttpController {
    async fn get_grow_database(&self) -> Result<GrowSystemRegistry, ControllerError> {
        let response: GrowDatabaseResponse = self.fetch_json("/api/grow-database").await?;
        if response.status_code != GrowDatabaseStatus::OperationOk {
            return Err(ControllerError::Status(format!("{:?}", response.status_code)));
        }
        let systems = response
            .new_grow_database
            .ok_or_else(|| ControllerError::Malformed("missing newGrowDatabase".to_string()))?;
        GrowSystemRegistry::new(systems).map_err(|e| ControllerError::Malformed(e.to_string()))
    }

    async fn get_sensor_snapshot(&self) -> Result<SensorSnapshot, ControllerError> {
        let response: SensorSnapshotResponse = self.fetch_json("/api/sensor-snapshot").await?;
        if response.module_status != SensorModuleStatus::Connected {
            return Err(ControllerError::Status(format!("{:?}", response.module_status)));
        }
        SensorSnapshot::from_parts(response.sensor_data, &response.display_parameters)
            .map_err(|e| ControllerError::Malformed(e.to_string()))
    }
}

/// credential sent to the controller: lower-case hex sha-256 of the passphrase
pub fn hash_passphrase(passphrase: &str) -> String {
    hex::encode(Sha256::digest(passphrase.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_passphrase() {
        assert_eq!(
            hash_passphrase("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_unknown_status_is_other() {
        let r: GrowDatabaseResponse =
            serde_json::from_str(r#"{"statusCode": "OPERATION_FAILED"}"#).unwrap();
        assert_eq!(r.status_code, GrowDatabaseStatus::Other);
        assert!(r.new_grow_database.is_none());

        let r: SensorSnapshotResponse =
            serde_json::from_str(r#"{"moduleStatus": "DISCONNECTED"}"#).unwrap();
        assert_eq!(r.module_status, SensorModuleStatus::Other);
    }

    #[test]
    fn test_parse_snapshot_response() {
        let json = r#"{
            "moduleStatus": "CONNECTED",
            "sensorData": [
                {"sensor_id": "co2-1", "readings": [{"name": "ppm", "value": 440}]}
            ],
            "displayParameters": [
                {"sensor_id": "co2-1", "reading_labels": {"ppm": "CO2"}}
            ]
        }"#;
        let r: SensorSnapshotResponse = serde_json::from_str(json).unwrap();
        assert_eq!(r.module_status, SensorModuleStatus::Connected);
        let snapshot = SensorSnapshot::from_parts(r.sensor_data, &r.display_parameters).unwrap();
        let reading = snapshot.sensor("co2-1").unwrap().reading("ppm").unwrap();
        assert_eq!(reading.display_label(), "CO2");
    }
}
