//! ==============================================================================
//! domain.rs - annotation data model
//! ==============================================================================
//!
//! purpose:
//!     plain value types shared by the fetch stage (annotation.rs) and the
//!     render stage (composer.rs). nothing in here talks to the network or
//!     the filesystem.
//!
//! structure:
//!     - GrowSystemRegistry / GrowSystem: what the controller knows about
//!       each enclosure (name, inception date)
//!     - SensorSnapshot / SensorReadingSet / SensorReading: latest poll
//!     - OverlayDescriptor: which reading the caller wants burned in
//!     - EnrichedView: fully resolved strings handed to the composer
//!     - CacheRecord: what the snapshot cache persists
//!
//! ==============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// minimum width of a formatted sensor value, in characters
pub const VALUE_WIDTH: usize = 7;

/// rendered for value types the overlay does not know how to print
pub const UNKNOWN_VALUE: &str = "????";

// ==============================================================================
// grow systems
// ==============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate grow system id: {0}")]
    DuplicateId(String),
}

/// one monitored enclosure
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowSystem {
    pub id: String,
    pub name: String,
    pub inception_date: NaiveDate,
}

impl GrowSystem {
    /// whole days between inception and `reference`.
    /// a future inception date yields a negative age; it is not clamped.
    pub fn age_in_days(&self, reference: NaiveDate) -> i64 {
        (reference - self.inception_date).num_days()
    }
}

/// immutable, ordered collection of grow systems with o(1) lookup by id
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GrowSystem>", into = "Vec<GrowSystem>")]
pub struct GrowSystemRegistry {
    systems: Vec<GrowSystem>,
    index: HashMap<String, usize>,
}

impl GrowSystemRegistry {
    pub fn new(systems: Vec<GrowSystem>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(systems.len());
        for (i, system) in systems.iter().enumerate() {
            if index.insert(system.id.clone(), i).is_some() {
                return Err(RegistryError::DuplicateId(system.id.clone()));
            }
        }
        Ok(Self { systems, index })
    }

    pub fn get(&self, id: &str) -> Option<&GrowSystem> {
        self.index.get(id).map(|&i| &self.systems[i])
    }

    pub fn systems(&self) -> &[GrowSystem] {
        &self.systems
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

impl TryFrom<Vec<GrowSystem>> for GrowSystemRegistry {
    type Error = RegistryError;

    fn try_from(systems: Vec<GrowSystem>) -> Result<Self, Self::Error> {
        Self::new(systems)
    }
}

impl From<GrowSystemRegistry> for Vec<GrowSystem> {
    fn from(registry: GrowSystemRegistry) -> Self {
        registry.systems
    }
}

// ==============================================================================
// sensors
// ==============================================================================

/// a single reading value as reported by the controller.
/// `Other` keeps whatever json the controller sent for types we cannot print.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Other(serde_json::Value),
}

impl SensorValue {
    /// render for the overlay: right-aligned to VALUE_WIDTH.
    /// longer strings overflow, they are never truncated.
    pub fn format(&self) -> String {
        let raw = match self {
            SensorValue::Integer(v) => v.to_string(),
            SensorValue::Float(v) => format!("{:.2}", v),
            SensorValue::Boolean(true) => "TRUE".to_string(),
            SensorValue::Boolean(false) => "FALSE".to_string(),
            SensorValue::Other(_) => UNKNOWN_VALUE.to_string(),
        };
        format!("{:>width$}", raw, width = VALUE_WIDTH)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub name: String,
    #[serde(default)]
    pub label: String,
    pub value: SensorValue,
}

impl SensorReading {
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

/// every reading exposed by one physical sensor module
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorReadingSet {
    pub sensor_id: String,
    pub readings: Vec<SensorReading>,
}

impl SensorReadingSet {
    pub fn reading(&self, name: &str) -> Option<&SensorReading> {
        self.readings.iter().find(|r| r.name == name)
    }
}

/// per-sensor display hints shipped alongside a snapshot
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorDisplayMetadata {
    pub sensor_id: String,
    /// reading name -> human label
    #[serde(default)]
    pub reading_labels: HashMap<String, String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("duplicate sensor id: {0}")]
    DuplicateSensor(String),
    #[error("duplicate reading '{reading}' on sensor {sensor}")]
    DuplicateReading { sensor: String, reading: String },
}

/// sensor id -> reading set, as of the last poll.
/// serialized as a list of reading sets, sorted by sensor id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SensorReadingSet>", into = "Vec<SensorReadingSet>")]
pub struct SensorSnapshot {
    sensors: HashMap<String, SensorReadingSet>,
}

impl SensorSnapshot {
    /// sensor ids must be unique, and reading names unique within a sensor
    pub fn new(sensor_data: Vec<SensorReadingSet>) -> Result<Self, SnapshotError> {
        let mut sensors = HashMap::with_capacity(sensor_data.len());
        for set in sensor_data {
            let duplicate = {
                let mut seen = HashSet::with_capacity(set.readings.len());
                set.readings
                    .iter()
                    .find(|r| !seen.insert(r.name.as_str()))
                    .map(|r| r.name.clone())
            };
            if let Some(reading) = duplicate {
                return Err(SnapshotError::DuplicateReading { sensor: set.sensor_id, reading });
            }
            if sensors.contains_key(&set.sensor_id) {
                return Err(SnapshotError::DuplicateSensor(set.sensor_id));
            }
            sensors.insert(set.sensor_id.clone(), set);
        }
        Ok(Self { sensors })
    }

    /// build from raw controller data. display metadata fills in labels for
    /// readings that arrived without one.
    pub fn from_parts(
        mut sensor_data: Vec<SensorReadingSet>,
        display_metadata: &[SensorDisplayMetadata],
    ) -> Result<Self, SnapshotError> {
        let labels: HashMap<&str, &SensorDisplayMetadata> = display_metadata
            .iter()
            .map(|m| (m.sensor_id.as_str(), m))
            .collect();

        for set in sensor_data.iter_mut() {
            let Some(meta) = labels.get(set.sensor_id.as_str()) else {
                continue;
            };
            for reading in set.readings.iter_mut().filter(|r| r.label.is_empty()) {
                if let Some(label) = meta.reading_labels.get(&reading.name) {
                    reading.label = label.clone();
                }
            }
        }
        Self::new(sensor_data)
    }

    pub fn sensor(&self, sensor_id: &str) -> Option<&SensorReadingSet> {
        self.sensors.get(sensor_id)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl TryFrom<Vec<SensorReadingSet>> for SensorSnapshot {
    type Error = SnapshotError;

    fn try_from(sensor_data: Vec<SensorReadingSet>) -> Result<Self, Self::Error> {
        Self::new(sensor_data)
    }
}

impl From<SensorSnapshot> for Vec<SensorReadingSet> {
    fn from(snapshot: SensorSnapshot) -> Self {
        let mut sets: Vec<SensorReadingSet> = snapshot.sensors.into_values().collect();
        sets.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));
        sets
    }
}

// ==============================================================================
// overlay request / result
// ==============================================================================

/// "show reading `reading_id` of sensor `sensor_id`", from configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayDescriptor {
    pub sensor_id: String,
    pub reading_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayRow {
    pub label: String,
    pub value: String,
}

/// everything the composer draws. rows keep descriptor order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrichedView {
    pub grow_system_name: String,
    pub age_in_days: i64,
    pub rows: Vec<DisplayRow>,
}

impl EnrichedView {
    pub fn age_text(&self) -> String {
        format!("Day {}", self.age_in_days)
    }
}

// ==============================================================================
// cache record
// ==============================================================================

/// last-known-good controller state. both halves are optional so a
/// hand-edited or older cache file still loads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(default)]
    pub grow_database: Option<GrowSystemRegistry>,
    #[serde(default)]
    pub sensor_data: Option<SensorSnapshot>,
}
