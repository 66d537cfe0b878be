//! Snapshot persistence for warm restarts.
//!
//! The whole last-known market state is serialized to one JSON file under
//! the user data directory. On startup the snapshot gives the UI an instant
//! paint while the orchestrator re-hydrates in the background. Writes are
//! atomic (temp file + rename) so a crash mid-save never corrupts the file.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, warn};

use crate::models::CachedSnapshot;

/// Key-value persistence seam for the snapshot. Higher layers may supply a
/// different backing store; the backend ships the file implementation.
pub trait SnapshotStore: Send + Sync {
    /// The last snapshot, if present, parseable and younger than 24 h.
    fn load(&self) -> Option<CachedSnapshot>;
    /// Replace the stored snapshot.
    fn save(&self, snapshot: &CachedSnapshot) -> anyhow::Result<()>;
}

pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Option<CachedSnapshot> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return None,
        };
        let snapshot: CachedSnapshot = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot unreadable, ignoring");
                return None;
            }
        };
        if !snapshot.is_fresh(Utc::now()) {
            debug!(path = %self.path.display(), "snapshot older than 24h, ignoring");
            return None;
        }
        Some(snapshot)
    }

    fn save(&self, snapshot: &CachedSnapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(snapshot)?;

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), bytes = json.len(), "snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Quote;

    fn store_in(dir: &tempfile::TempDir) -> FileSnapshotStore {
        FileSnapshotStore::new(dir.path().join("cache").join("market_data.json"))
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_in(&dir).load().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let snapshot = CachedSnapshot {
            quotes: Some(vec![Quote {
                code: "sh600519".into(),
                name: "贵州茅台".into(),
                price: 1688.0,
                ..Default::default()
            }]),
            cache_time: Utc::now(),
            ..Default::default()
        };
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap();
        let quotes = loaded.quotes.unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].code, "sh600519");
        assert_eq!(quotes[0].name, "贵州茅台");
    }

    #[test]
    fn stale_snapshot_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let snapshot = CachedSnapshot {
            cache_time: Utc::now() - chrono::Duration::hours(25),
            ..Default::default()
        };
        store.save(&snapshot).unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn corrupt_file_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(dir.path().join("cache")).unwrap();
        fs::write(dir.path().join("cache").join("market_data.json"), b"{not json").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut snapshot = CachedSnapshot { cache_time: Utc::now(), ..Default::default() };
        store.save(&snapshot).unwrap();

        snapshot.quotes = Some(vec![Quote { code: "sz000001".into(), price: 10.5, ..Default::default() }]);
        snapshot.cache_time = Utc::now();
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.quotes.unwrap()[0].code, "sz000001");
    }
}
