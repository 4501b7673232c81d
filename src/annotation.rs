//! ==============================================================================
//! annotation.rs - resolves what to burn into a photo
//! ==============================================================================
//!
//! purpose:
//!     turns (grow system id, overlay descriptors) into an EnrichedView, using
//!     live controller data when a complete fetch succeeds and the snapshot
//!     cache otherwise.
//!
//! fetch cycle:
//!
//! ```text
//!     cache.load() ──► cached (registry?, snapshot?)
//!          │
//!     controller ──► live registry?  (OPERATION_OK only)
//!                ──► live snapshot?  (CONNECTED only, skipped with no overlays
//!                                     or when the registry already failed)
//!          │
//!     both live ──► working set = live pair, cache.store(live pair)
//!     otherwise ──► working set = cached pair, cache untouched
//! ```
//!
//! invariant:
//!     a live piece is never mixed with a cached piece: the registry and the
//!     snapshot shown together always come from the same cycle.
//!
//! relationships:
//!     - uses: controller.rs (ControllerApi), cache.rs (SnapshotCache)
//!     - produces: domain::EnrichedView for composer.rs
//!
//! ==============================================================================

use crate::cache::SnapshotCache;
use crate::controller::ControllerApi;
use crate::domain::{
    CacheRecord, DisplayRow, EnrichedView, GrowSystemRegistry, OverlayDescriptor, SensorSnapshot,
};

use chrono::NaiveDate;

pub struct AnnotationService<C> {
    controller: C,
    cache: SnapshotCache,
}

/// the registry/snapshot pair a resolution works from
#[derive(Debug, Default)]
struct WorkingSet {
    registry: Option<GrowSystemRegistry>,
    snapshot: Option<SensorSnapshot>,
}

impl<C: ControllerApi> AnnotationService<C> {
    pub fn new(controller: C, cache: SnapshotCache) -> Self {
        Self { controller, cache }
    }

    /// resolve against today's local date
    pub async fn resolve(
        &self,
        grow_system_id: &str,
        descriptors: &[OverlayDescriptor],
    ) -> Option<EnrichedView> {
        let today = chrono::Local::now().date_naive();
        self.resolve_on(grow_system_id, descriptors, today).await
    }

    pub async fn resolve_on(
        &self,
        grow_system_id: &str,
        descriptors: &[OverlayDescriptor],
        today: NaiveDate,
    ) -> Option<EnrichedView> {
        let cached = self.cache.load().unwrap_or_default();
        let working = self.fetch_cycle(cached, !descriptors.is_empty()).await;

        let registry = working.registry.as_ref()?;
        let Some(grow_system) = registry.get(grow_system_id) else {
            tracing::warn!("[ANNOTATE] Grow system '{}' not found in registry", grow_system_id);
            return None;
        };

        let age = grow_system.age_in_days(today);
        if age < 0 {
            tracing::warn!(
                "[ANNOTATE] Grow system '{}' inception date {} is in the future",
                grow_system_id,
                grow_system.inception_date
            );
        }

        let rows = match &working.snapshot {
            Some(snapshot) => build_rows(snapshot, descriptors),
            None => Vec::new(),
        };

        Some(EnrichedView {
            grow_system_name: grow_system.name.clone(),
            age_in_days: age,
            rows,
        })
    }

    /// one live fetch, merged with the cache per the all-or-nothing rule
    async fn fetch_cycle(&self, cached: CacheRecord, want_sensors: bool) -> WorkingSet {
        let live_registry = match self.controller.get_grow_database().await {
            Ok(registry) => Some(registry),
            Err(e) => {
                tracing::warn!("[ANNOTATE] Grow database fetch failed: {}", e);
                None
            }
        };

        if !want_sensors {
            // no telemetry requested: the registry alone is a full cycle,
            // but only registry+snapshot pairs are ever persisted
            return match live_registry {
                Some(registry) => WorkingSet { registry: Some(registry), snapshot: None },
                None => {
                    tracing::info!("[ANNOTATE] Using cached grow database");
                    WorkingSet { registry: cached.grow_database, snapshot: None }
                }
            };
        }

        let live_snapshot = if live_registry.is_some() {
            match self.controller.get_sensor_snapshot().await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!("[ANNOTATE] Sensor snapshot fetch failed: {}", e);
                    None
                }
            }
        } else {
            // the pair is already incomplete, a snapshot could not be used
            None
        };

        match (live_registry, live_snapshot) {
            (Some(registry), Some(snapshot)) => {
                let record = CacheRecord {
                    grow_database: Some(registry),
                    sensor_data: Some(snapshot),
                };
                if let Err(e) = self.cache.store(&record) {
                    tracing::warn!("[ANNOTATE] Could not update cache: {:#}", e);
                }
                WorkingSet {
                    registry: record.grow_database,
                    snapshot: record.sensor_data,
                }
            }
            _ => {
                tracing::info!(
                    has_grow_database = cached.grow_database.is_some(),
                    has_sensor_data = cached.sensor_data.is_some(),
                    "[ANNOTATE] Live fetch incomplete, falling back to cache"
                );
                WorkingSet {
                    registry: cached.grow_database,
                    snapshot: cached.sensor_data,
                }
            }
        }
    }
}

/// one row per descriptor whose sensor and reading exist, in descriptor order
fn build_rows(snapshot: &SensorSnapshot, descriptors: &[OverlayDescriptor]) -> Vec<DisplayRow> {
    descriptors
        .iter()
        .filter_map(|d| {
            let Some(reading) = snapshot.sensor(&d.sensor_id).and_then(|s| s.reading(&d.reading_id)) else {
                tracing::debug!("[ANNOTATE] Skipping {}/{}: not in snapshot", d.sensor_id, d.reading_id);
                return None;
            };
            let label = d.display_name.as_deref().unwrap_or_else(|| reading.display_label());
            Some(DisplayRow {
                label: format!("{}:", label),
                value: reading.value.format(),
            })
        })
        .collect()
}
