use std::path::PathBuf;

use crate::session::SessionStore;

/// Whole-collection snapshot persistence. Read once at startup, overwritten
/// wholesale after every mutation. Writes are best-effort: callers log and
/// move on.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Option<SessionStore>;
    fn save(&self, store: &SessionStore) -> anyhow::Result<()>;
}

pub struct JsonSnapshotFile {
    path: PathBuf,
}

impl JsonSnapshotFile {
    pub fn initialize(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p,
            None => resolve_default_snapshot_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

fn resolve_default_snapshot_path() -> anyhow::Result<PathBuf> {
    let base = std::env::var("XDG_DATA_HOME").ok().map(PathBuf::from).unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".local").join("share")
    });
    let dir = base.join("quiet_observer");
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join("sessions.json"))
}

impl SnapshotStore for JsonSnapshotFile {
    /// A missing, unreadable, or incoherent snapshot yields `None`; the caller
    /// falls back to a fresh collection.
    fn load(&self) -> Option<SessionStore> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<SessionStore>(&raw) {
            Ok(store) if store.coherent() => Some(store),
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "snapshot violates collection invariants, starting fresh");
                None
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "unreadable snapshot, starting fresh");
                None
            }
        }
    }

    fn save(&self, store: &SessionStore) -> anyhow::Result<()> {
        let raw = serde_json::to_string(store)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}
