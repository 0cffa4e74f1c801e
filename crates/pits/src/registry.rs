//! Pit registry: the single in-memory owner of every live pit.
//!
//! One `PitRegistry` is constructed at startup and shared (behind `Arc`) by
//! the transport gateway, the eviction sweeper, and the shutdown path. It
//! guarantees:
//!
//! - at most one in-memory document per slug, with concurrent `ensure` calls
//!   collapsed into a single disk load,
//! - connection counts that never go negative,
//! - one save for every transition of a pit's connection count from 1 to 0,
//! - evictions that re-check liveness under the registry lock immediately
//!   before deleting, so a reconnection always wins the race.

use std::{collections::HashMap, path::{Path, PathBuf}, sync::Arc, time::Duration};

use {
    bytes::Bytes,
    serde::Serialize,
    thiserror::Error,
    tokio::{
        sync::{Mutex, OnceCell, broadcast},
        time::Instant,
    },
    tracing::{debug, info, warn},
};

use crate::{
    doc::PitDoc,
    store::{PitMetadata, PitStore, now_ms},
};

/// Maximum accepted slug length.
const MAX_SLUG_LEN: usize = 64;

/// Fan-out channel capacity per pit. Subscribers that fall further behind
/// lag and are told how many updates they missed.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

// ── Slugs ────────────────────────────────────────────────────────────────────

/// Errors surfaced to the transport gateway.
#[derive(Debug, Error)]
pub enum PitError {
    /// The slug is empty, too long, or contains characters that are unsafe
    /// as a filename stem.
    #[error("invalid pit slug: {0:?}")]
    InvalidSlug(String),
}

/// Slugs double as storage filename stems, so the accepted alphabet is
/// restricted to URL-safe characters that cannot traverse paths.
pub fn validate_slug(slug: &str) -> Result<(), PitError> {
    let ok = !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && slug
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if ok {
        Ok(())
    } else {
        Err(PitError::InvalidSlug(slug.to_string()))
    }
}

// ── Configuration ────────────────────────────────────────────────────────────

/// Registry tuning, injected at construction.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory holding snapshot and sidecar files.
    pub dir: PathBuf,
    /// Idle window after which an unconnected pit becomes evictable.
    pub ttl: Duration,
    /// How often the sweeper scans for expired pits.
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./pits"),
            ttl: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

// ── Live pit ─────────────────────────────────────────────────────────────────

/// One relayed document update, tagged with the connection that produced it
/// so the gateway can avoid echoing it back to its origin.
#[derive(Debug, Clone)]
pub struct PitUpdate {
    pub origin: u64,
    pub bytes: Bytes,
}

/// A live pit: the exclusively owned document plus its update fan-out.
///
/// Exactly one `Pit` exists per slug at any time; the registry enforces it.
pub struct Pit {
    slug: String,
    doc: Mutex<PitDoc>,
    updates: broadcast::Sender<PitUpdate>,
}

impl Pit {
    fn new(slug: &str, doc: PitDoc) -> Arc<Self> {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Arc::new(Self {
            slug: slug.to_string(),
            doc: Mutex::new(doc),
            updates,
        })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Subscribe to updates merged into this pit.
    pub fn subscribe(&self) -> broadcast::Receiver<PitUpdate> {
        self.updates.subscribe()
    }

    /// Encode the full current document state.
    pub async fn encode_full(&self) -> Vec<u8> {
        self.doc.lock().await.encode_full()
    }

    async fn apply(&self, bytes: &[u8]) -> bool {
        match self.doc.lock().await.apply_update(bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!(slug = %self.slug, error = %e, "dropping undecodable update");
                false
            },
        }
    }

    fn publish(&self, update: PitUpdate) {
        // Err just means nobody is subscribed right now.
        let _ = self.updates.send(update);
    }
}

// ── Registry bookkeeping ─────────────────────────────────────────────────────

/// Tracking state for one slug.
///
/// The document sits behind a `OnceCell` so concurrent `ensure` calls during
/// the initial disk load all await the same initialization instead of
/// issuing duplicate loads.
struct PitEntry {
    slot: Arc<OnceCell<Arc<Pit>>>,
    /// Wall-clock access stamp (epoch ms) for stats and the sidecar.
    last_access: u64,
    /// Monotonic access stamp driving TTL decisions.
    touched_at: Instant,
    connections: u32,
}

impl PitEntry {
    fn new() -> Self {
        Self {
            slot: Arc::new(OnceCell::new()),
            last_access: now_ms(),
            touched_at: Instant::now(),
            connections: 0,
        }
    }

    fn touch(&mut self) {
        // The wall clock may step backwards; the access stamp never does.
        self.last_access = self.last_access.max(now_ms());
        self.touched_at = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.touched_at.elapsed()
    }
}

// ── Stats ────────────────────────────────────────────────────────────────────

/// One tracked pit, as reported by the stats endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PitStats {
    pub slug: String,
    pub last_access: u64,
    pub connections: u32,
    pub age_ms: u64,
}

/// Registry-wide stats payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_pits: usize,
    pub ttl_ms: u64,
    pub pits_dir: String,
    pub pits: Vec<PitStats>,
}

// ── Registry ─────────────────────────────────────────────────────────────────

pub struct PitRegistry {
    config: RegistryConfig,
    store: PitStore,
    pits: Mutex<HashMap<String, PitEntry>>,
}

impl PitRegistry {
    /// Build a registry over `config.dir`, creating the directory if needed.
    pub async fn open(config: RegistryConfig) -> anyhow::Result<Self> {
        let store = PitStore::new(&config.dir);
        store.ensure_dir().await?;
        Ok(Self {
            config,
            store,
            pits: Mutex::new(HashMap::new()),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.config.cleanup_interval
    }

    pub fn pits_dir(&self) -> &Path {
        &self.config.dir
    }

    /// Return the live pit for `slug`, loading its durable snapshot (or
    /// starting empty) on first reference.
    ///
    /// Concurrent calls for the same slug during the initial load share one
    /// load; every caller gets the same document instance.
    pub async fn ensure(&self, slug: &str) -> Result<Arc<Pit>, PitError> {
        validate_slug(slug)?;
        let slot = {
            let mut pits = self.pits.lock().await;
            let entry = pits.entry(slug.to_string()).or_insert_with(PitEntry::new);
            entry.touch();
            Arc::clone(&entry.slot)
        };
        // The load runs outside the registry lock; the cell collapses racing
        // initializers into one.
        let pit = slot
            .get_or_init(|| async {
                let doc = match self.store.load(slug).await {
                    Some(bytes) => match PitDoc::from_snapshot(&bytes) {
                        Ok(doc) => doc,
                        Err(e) => {
                            warn!(slug = %slug, error = %e, "pit snapshot corrupt, starting empty");
                            PitDoc::new()
                        },
                    },
                    None => {
                        debug!(slug = %slug, "no stored snapshot, starting empty");
                        PitDoc::new()
                    },
                };
                Pit::new(slug, doc)
            })
            .await;
        Ok(Arc::clone(pit))
    }

    /// Whether a pit exists in memory or on disk, without materializing a
    /// document.
    pub async fn exists(&self, slug: &str) -> bool {
        if validate_slug(slug).is_err() {
            return false;
        }
        if self.pits.lock().await.contains_key(slug) {
            return true;
        }
        self.store.snapshot_exists(slug).await
    }

    /// Reset a pit's idle clock. Unknown slugs are ignored: event ordering
    /// relative to pit creation is not guaranteed by the transport.
    pub async fn touch(&self, slug: &str) {
        if let Some(entry) = self.pits.lock().await.get_mut(slug) {
            entry.touch();
        }
    }

    /// Record a new client attachment.
    pub async fn increment_connections(&self, slug: &str) {
        if let Some(entry) = self.pits.lock().await.get_mut(slug) {
            entry.connections += 1;
            entry.touch();
        }
    }

    /// Record a detachment. The connection that takes the count from 1 to 0
    /// triggers exactly one save of the pit's full state.
    pub async fn decrement_connections(&self, slug: &str) {
        let last_out = {
            let mut pits = self.pits.lock().await;
            match pits.get_mut(slug) {
                Some(entry) => {
                    let was = entry.connections;
                    entry.connections = entry.connections.saturating_sub(1);
                    entry.touch();
                    if was == 1 {
                        entry.slot.get().cloned().map(|pit| (pit, entry.last_access))
                    } else {
                        None
                    }
                },
                None => None,
            }
        };
        if let Some((pit, last_access)) = last_out {
            self.save_pit(&pit, last_access, 0).await;
        }
    }

    /// Merge a client update into the pit and fan it out to the other
    /// attachments. Unknown or not-yet-loaded slugs are ignored.
    pub async fn apply_update(&self, slug: &str, origin: u64, bytes: Bytes) {
        let pit = {
            let mut pits = self.pits.lock().await;
            match pits.get_mut(slug) {
                Some(entry) => {
                    entry.touch();
                    entry.slot.get().cloned()
                },
                None => None,
            }
        };
        let Some(pit) = pit else { return };
        if pit.apply(&bytes).await {
            pit.publish(PitUpdate { origin, bytes });
        }
    }

    /// Stats snapshot for the observability endpoint.
    pub async fn stats(&self) -> RegistryStats {
        let pits = self.pits.lock().await;
        let now = now_ms();
        let mut entries: Vec<PitStats> = pits
            .iter()
            .map(|(slug, entry)| PitStats {
                slug: slug.clone(),
                last_access: entry.last_access,
                connections: entry.connections,
                age_ms: now.saturating_sub(entry.last_access),
            })
            .collect();
        entries.sort_by(|a, b| a.slug.cmp(&b.slug));
        RegistryStats {
            total_pits: entries.len(),
            ttl_ms: self.config.ttl.as_millis() as u64,
            pits_dir: self.config.dir.display().to_string(),
            pits: entries,
        }
    }

    /// Slugs currently eligible for eviction: no connections and idle past
    /// the TTL. The sweeper re-checks through [`PitRegistry::evict`] before
    /// anything is deleted.
    pub async fn expired_slugs(&self) -> Vec<String> {
        let pits = self.pits.lock().await;
        pits.iter()
            .filter(|(_, entry)| entry.connections == 0 && entry.idle_for() > self.config.ttl)
            .map(|(slug, _)| slug.clone())
            .collect()
    }

    /// Evict one pit: drop it from memory and delete its durable record.
    /// Irreversible. Returns whether the pit was actually evicted.
    ///
    /// Both eviction conditions are re-checked under the registry lock right
    /// before removal, so a client that reconnected after the sweep's scan
    /// aborts the eviction. The files are deleted while the lock is still
    /// held: a racing `ensure` cannot reload a snapshot that is about to be
    /// unlinked.
    pub async fn evict(&self, slug: &str) -> bool {
        let mut pits = self.pits.lock().await;
        match pits.get(slug) {
            Some(entry) if entry.connections == 0 && entry.idle_for() > self.config.ttl => {},
            _ => return false,
        }
        pits.remove(slug);
        self.store.delete(slug).await;
        info!(slug = %slug, "evicted expired pit");
        true
    }

    /// Best-effort save of every loaded pit. Used at shutdown: this is a
    /// flush, never an eviction. Nothing is removed from memory or disk.
    pub async fn flush_all(&self) {
        let loaded: Vec<(Arc<Pit>, u64, u32)> = {
            let pits = self.pits.lock().await;
            pits.values()
                .filter_map(|entry| {
                    entry
                        .slot
                        .get()
                        .cloned()
                        .map(|pit| (pit, entry.last_access, entry.connections))
                })
                .collect()
        };
        info!(pits = loaded.len(), "flushing pits");
        for (pit, last_access, connections) in loaded {
            self.save_pit(&pit, last_access, connections).await;
        }
    }

    async fn save_pit(&self, pit: &Pit, last_access: u64, connections: u32) {
        let snapshot = pit.encode_full().await;
        let meta = PitMetadata {
            slug: pit.slug().to_string(),
            last_access,
            last_saved: now_ms(),
            size_bytes: snapshot.len() as u64,
            connections,
        };
        self.store.save(&meta, &snapshot).await;
    }
}
