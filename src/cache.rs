//! ==============================================================================
//! cache.rs - last-known-good snapshot cache
//! ==============================================================================
//!
//! purpose:
//!     keeps the most recent complete controller state (grow database +
//!     sensor snapshot) on disk so a capture can still be annotated when the
//!     controller is down.
//!
//! guarantees:
//!     - load() never fails: missing or unreadable files are "no cache"
//!     - store() is all-or-nothing: temp file in the same directory, fsync,
//!       atomic rename over the old record. a failed write leaves the
//!       previous record in place
//!     - store() holds an exclusive advisory lock on a sibling lock file,
//!       load() a shared one, so overlapping snapper runs cannot interleave.
//!       a cache that cannot be locked (read-only directory) is read unlocked
//!
//! relationships:
//!     - used by: annotation.rs (read before every fetch, written after a
//!       complete fetch)
//!     - stores: domain::CacheRecord as json
//!
//! ==============================================================================

use crate::domain::CacheRecord;

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CACHE_FILE_NAME: &str = "annotation_cache.json";
const LOCK_FILE_NAME: &str = "annotation_cache.lock";

#[derive(Clone, Debug)]
pub struct SnapshotCache {
    dir: PathBuf,
}

impl SnapshotCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE_NAME)
    }

    /// read the cached record. `None` when there is nothing usable.
    pub fn load(&self) -> Option<CacheRecord> {
        let path = self.path();
        if !path.exists() {
            tracing::debug!("[CACHE] No cache at {}", path.display());
            return None;
        }

        // renames are atomic, so an unlocked read still sees a whole record
        let _lock = match self.lock_shared() {
            Ok(lock) => Some(lock),
            Err(e) => {
                tracing::debug!("[CACHE] Reading without lock: {:#}", e);
                None
            }
        };

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("[CACHE] Failed to read {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<CacheRecord>(&content) {
            Ok(record) => {
                tracing::debug!(
                    has_grow_database = record.grow_database.is_some(),
                    has_sensor_data = record.sensor_data.is_some(),
                    "[CACHE] Loaded {}",
                    path.display()
                );
                Some(record)
            }
            Err(e) => {
                tracing::warn!("[CACHE] Ignoring malformed cache {}: {}", path.display(), e);
                None
            }
        }
    }

    /// replace the cached record atomically
    pub fn store(&self, record: &CacheRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("cannot create cache directory {}", self.dir.display()))?;

        let bytes = serde_json::to_vec_pretty(record).context("cannot serialize cache record")?;

        let _lock = self.lock_exclusive()?;
        atomic_write(&self.dir, &self.path(), &bytes)?;
        tracing::debug!("[CACHE] Stored {} bytes to {}", bytes.len(), self.path().display());
        Ok(())
    }

    /// the lock file, created when the directory allows it
    fn lock_file(&self) -> Result<File> {
        let path = self.dir.join(LOCK_FILE_NAME);
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .or_else(|_| File::open(&path))
            .with_context(|| format!("cannot open cache lock file {}", path.display()))
    }

    /// writer lock, held until the returned guard drops
    fn lock_exclusive(&self) -> Result<CacheLock> {
        let file = self.lock_file()?;
        FileExt::lock_exclusive(&file).context("cannot lock cache")?;
        Ok(CacheLock { file })
    }

    /// reader lock: excludes writers, not other readers
    fn lock_shared(&self) -> Result<CacheLock> {
        let file = self.lock_file()?;
        FileExt::lock_shared(&file).context("cannot lock cache for reading")?;
        Ok(CacheLock { file })
    }
}

struct CacheLock {
    file: File,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// temp file in `dir` + fsync + rename onto `final_path`.
/// the temp file is removed on any error when the NamedTempFile drops.
fn atomic_write(dir: &Path, final_path: &Path, bytes: &[u8]) -> Result<()> {
    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("cannot create temp file in {}", dir.display()))?;
    temp.as_file_mut()
        .write_all(bytes)
        .context("cannot write temp cache file")?;
    temp.as_file().sync_all().context("cannot sync temp cache file")?;
    temp.persist(final_path)
        .with_context(|| format!("cannot persist cache to {}", final_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        GrowSystem, GrowSystemRegistry, SensorReading, SensorReadingSet, SensorSnapshot,
        SensorValue,
    };
    use chrono::NaiveDate;

    fn sample_record() -> CacheRecord {
        let registry = GrowSystemRegistry::new(vec![GrowSystem {
            id: "greenhouse-1".to_string(),
            name: "Harvest Chamber".to_string(),
            inception_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        }])
        .unwrap();
        let snapshot = SensorSnapshot::from_parts(
            vec![SensorReadingSet {
                sensor_id: "co2-1".to_string(),
                readings: vec![
                    SensorReading {
                        name: "ppm".to_string(),
                        label: "CO2".to_string(),
                        value: SensorValue::Integer(440),
                    },
                    SensorReading {
                        name: "ok".to_string(),
                        label: String::new(),
                        value: SensorValue::Boolean(true),
                    },
                    SensorReading {
                        name: "temp".to_string(),
                        label: String::new(),
                        value: SensorValue::Float(29.25),
                    },
                ],
            }],
            &[],
        )
        .unwrap();
        CacheRecord {
            grow_database: Some(registry),
            sensor_data: Some(snapshot),
        }
    }

    #[test]
    fn test_store_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        let record = sample_record();

        cache.store(&record).unwrap();
        assert_eq!(cache.load(), Some(record));
    }

    #[test]
    fn test_store_replaces_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());

        cache.store(&CacheRecord::default()).unwrap();
        let record = sample_record();
        cache.store(&record).unwrap();

        assert_eq!(cache.load(), Some(record));
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path().join("never-created"));
        assert!(cache.load().is_none());
    }

    #[test]
    fn test_malformed_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        fs::write(cache.path(), "{ \"grow_database\": [ truncated").unwrap();
        assert!(cache.load().is_none());
    }

    #[test]
    fn test_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path().join("nested").join("cache"));
        cache.store(&sample_record()).unwrap();
        assert!(cache.path().exists());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        cache.store(&sample_record()).unwrap();
        cache.store(&sample_record()).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![CACHE_FILE_NAME.to_string(), LOCK_FILE_NAME.to_string()]);
    }

    #[test]
    fn test_partial_record_loads() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        fs::write(cache.path(), r#"{"grow_database": []}"#).unwrap();

        let record = cache.load().unwrap();
        assert!(record.grow_database.unwrap().is_empty());
        assert!(record.sensor_data.is_none());
    }

    #[test]
    fn test_load_alongside_other_readers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        let record = sample_record();
        cache.store(&record).unwrap();

        // another run is reading: a second reader must not wait for it
        let other = File::open(dir.path().join(LOCK_FILE_NAME)).unwrap();
        FileExt::lock_shared(&other).unwrap();
        assert_eq!(cache.load(), Some(record));
        FileExt::unlock(&other).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_directory_still_loads() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        let record = sample_record();
        cache.store(&record).unwrap();
        fs::remove_file(dir.path().join(LOCK_FILE_NAME)).unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();

        let loaded = cache.load();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[test]
    fn test_concurrent_stores_never_tear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        cache.store(&sample_record()).unwrap();

        let records: Vec<CacheRecord> = (0..6)
            .map(|i| {
                let mut record = sample_record();
                let registry = GrowSystemRegistry::new(vec![GrowSystem {
                    id: format!("tent-{}", i),
                    name: format!("Tent {}", i),
                    inception_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                }])
                .unwrap();
                record.grow_database = Some(registry);
                record
            })
            .collect();

        std::thread::scope(|scope| {
            for record in &records {
                let cache = cache.clone();
                scope.spawn(move || {
                    for _ in 0..10 {
                        cache.store(record).unwrap();
                    }
                });
            }
            let reader = cache.clone();
            scope.spawn(move || {
                for _ in 0..50 {
                    // every load sees one complete record
                    assert!(reader.load().is_some());
                }
            });
        });

        let last = cache.load().unwrap();
        assert!(records.contains(&last));
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 2);
    }

    #[test]
    fn test_duplicate_sensor_ids_make_cache_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        fs::write(
            cache.path(),
            r#"{"grow_database": [], "sensor_data": [
                {"sensor_id": "co2-1", "readings": [{"name": "ppm", "value": 400}]},
                {"sensor_id": "co2-1", "readings": [{"name": "ppm", "value": 999}]}
            ]}"#,
        )
        .unwrap();
        assert!(cache.load().is_none());
    }
}
