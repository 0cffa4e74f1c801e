//! Durability writer/reader for pit snapshots.
//!
//! Each pit persists as two files under the pits directory: a binary
//! full-state snapshot (`<slug>.pit`) and a JSON metadata sidecar
//! (`<slug>.meta.json`). Writes are best-effort: failures are logged and
//! absorbed here, so a broken disk degrades persistence but never fails a
//! connection. Snapshots are overwritten in place; persistence is
//! explicitly ephemeral, not crash-safe.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, error, info},
};

/// Snapshot file extension.
const SNAPSHOT_EXT: &str = "pit";

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Metadata sidecar written next to every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitMetadata {
    pub slug: String,
    pub last_access: u64,
    pub last_saved: u64,
    pub size_bytes: u64,
    pub connections: u32,
}

/// File-backed store for pit snapshots and their metadata sidecars.
pub struct PitStore {
    dir: PathBuf,
}

impl PitStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the pits directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> anyhow::Result<()> {
        if !tokio::fs::try_exists(&self.dir).await.unwrap_or(false) {
            tokio::fs::create_dir_all(&self.dir).await?;
            info!(dir = %self.dir.display(), "created pits directory");
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{slug}.{SNAPSHOT_EXT}"))
    }

    fn metadata_path(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{slug}.meta.json"))
    }

    /// Read a pit's snapshot. A missing file means "new pit" and is not an
    /// error; any other failure is logged and likewise reported as absent,
    /// so the pit starts empty instead of failing the connection.
    pub async fn load(&self, slug: &str) -> Option<Vec<u8>> {
        match tokio::fs::read(self.snapshot_path(slug)).await {
            Ok(bytes) => {
                debug!(slug = %slug, bytes = bytes.len(), "loaded pit snapshot");
                Some(bytes)
            },
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                error!(slug = %slug, error = %e, "failed to read pit snapshot");
                None
            },
        }
    }

    /// Write a pit's full-state snapshot and metadata sidecar.
    ///
    /// Failures are logged and swallowed: the in-memory pit stays intact and
    /// the data-loss risk is surfaced in logs only, never retried.
    pub async fn save(&self, meta: &PitMetadata, snapshot: &[u8]) {
        if let Err(e) = self.try_save(meta, snapshot).await {
            error!(slug = %meta.slug, error = %e, "failed to save pit");
        }
    }

    async fn try_save(&self, meta: &PitMetadata, snapshot: &[u8]) -> anyhow::Result<()> {
        tokio::fs::write(self.snapshot_path(&meta.slug), snapshot).await?;
        let sidecar = serde_json::to_vec_pretty(meta)?;
        tokio::fs::write(self.metadata_path(&meta.slug), sidecar).await?;
        info!(
            slug = %meta.slug,
            bytes = snapshot.len(),
            connections = meta.connections,
            "saved pit"
        );
        Ok(())
    }

    /// Remove a pit's files. Missing files are fine; deletion is idempotent.
    pub async fn delete(&self, slug: &str) {
        for path in [self.snapshot_path(slug), self.metadata_path(slug)] {
            if let Err(e) = tokio::fs::remove_file(&path).await
                && e.kind() != ErrorKind::NotFound
            {
                error!(slug = %slug, path = %path.display(), error = %e, "failed to delete pit file");
            }
        }
    }

    /// Whether a durable snapshot exists for `slug`, without reading it.
    pub async fn snapshot_exists(&self, slug: &str) -> bool {
        tokio::fs::try_exists(self.snapshot_path(slug))
            .await
            .unwrap_or(false)
    }
}
