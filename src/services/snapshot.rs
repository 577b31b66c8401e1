use crate::error::PipelineResult;
use crate::models::telemetry::{ClassifiedReading, FleetSnapshot};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

const VERDICTS_FILE: &str = "device_verdicts.json";
const RECENT_WINDOW_FILE: &str = "recent_window.json";

/// Single-writer home of the fleet snapshot.
///
/// The durable copy lives at `<dir>/device_verdicts.json` and is replaced
/// with a temp-write-then-rename so readers never see a partial document.
/// The in-memory pointer is swapped only after the rename commits; readers
/// holding the previous `Arc` keep a consistent view mid-swap.
pub struct SnapshotStore {
    dir: PathBuf,
    current: RwLock<Option<Arc<FleetSnapshot>>>,
    file_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let store = Self {
            dir: dir.into(),
            current: RwLock::new(None),
            file_lock: Mutex::new(()),
        };
        store.load_existing();
        store
    }

    fn load_existing(&self) {
        let path = self.verdicts_path();
        if let Ok(content) = std::fs::read_to_string(&path) {
            match serde_json::from_str::<FleetSnapshot>(&content) {
                Ok(snapshot) => {
                    info!(
                        devices = snapshot.devices.len(),
                        "Loaded snapshot from {}",
                        path.display()
                    );
                    *self.current.write() = Some(Arc::new(snapshot));
                }
                Err(e) => warn!("Ignoring unreadable snapshot {}: {}", path.display(), e),
            }
        }
    }

    pub fn verdicts_path(&self) -> PathBuf {
        self.dir.join(VERDICTS_FILE)
    }

    /// Latest committed snapshot, if any run has completed or one was loaded
    /// from disk at startup.
    pub fn latest(&self) -> Option<Arc<FleetSnapshot>> {
        self.current.read().clone()
    }

    /// Atomically replace the persisted snapshot and swap the in-memory
    /// pointer. Returns the committed snapshot.
    pub async fn replace(&self, snapshot: FleetSnapshot) -> PipelineResult<Arc<FleetSnapshot>> {
        let snapshot = Arc::new(snapshot);
        let payload = serde_json::to_string_pretty(&*snapshot)?;
        self.write_atomic(self.verdicts_path(), payload).await?;
        *self.current.write() = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Export the recent-activity window beside the snapshot for inspection.
    pub async fn export_recent(&self, recent: &[ClassifiedReading]) -> PipelineResult<()> {
        let payload = serde_json::to_string_pretty(recent)?;
        self.write_atomic(self.dir.join(RECENT_WINDOW_FILE), payload)
            .await
    }

    async fn write_atomic(&self, path: PathBuf, payload: String) -> PipelineResult<()> {
        let _guard = self.file_lock.lock().await;

        fs::create_dir_all(&self.dir).await?;

        // Atomic write: write to temp file then rename
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, payload).await?;
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::telemetry::DeviceVerdict;
    use crate::models::telemetry::Severity;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn sample_snapshot() -> FleetSnapshot {
        let mut devices = BTreeMap::new();
        devices.insert(
            "device5".to_string(),
            DeviceVerdict {
                severity_counts: BTreeMap::from([(Severity::Low, 9), (Severity::High, 1)]),
                total_anomalies: 1,
                samples: 10,
            },
        );
        FleetSnapshot {
            generated_at: Utc::now(),
            devices,
        }
    }

    #[tokio::test]
    async fn replace_commits_and_swaps_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path());
        assert!(store.latest().is_none());

        store.replace(sample_snapshot()).await.unwrap();

        let latest = store.latest().expect("snapshot after replace");
        assert_eq!(latest.devices.len(), 1);
        assert!(store.verdicts_path().exists());
        assert!(!store.verdicts_path().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn reopen_loads_persisted_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SnapshotStore::open(dir.path());
            store.replace(sample_snapshot()).await.unwrap();
        }

        let reopened = SnapshotStore::open(dir.path());
        let latest = reopened.latest().expect("snapshot loaded from disk");
        assert_eq!(latest.devices["device5"].samples, 10);
        assert_eq!(latest.devices["device5"].total_anomalies, 1);
    }

    #[tokio::test]
    async fn replace_overwrites_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path());
        store.replace(sample_snapshot()).await.unwrap();

        let empty = FleetSnapshot {
            generated_at: Utc::now(),
            devices: BTreeMap::new(),
        };
        store.replace(empty).await.unwrap();

        assert!(store.latest().unwrap().devices.is_empty());
    }
}
