//! Pit lifecycle & persistence: the in-memory pit registry, its durability
//! layer, and the TTL eviction sweeper.
//!
//! A pit is an ephemeral, slug-addressed shared state space backed by one
//! replicated document. This crate owns the whole lifecycle:
//!
//! `UNLOADED → LOADING → ACTIVE ⇄ IDLE → EVICTED`
//!
//! Pits load lazily on first reference, save when their last connection
//! leaves, and are evicted (memory and disk together) once idle past the
//! TTL with nobody attached. Shutdown flushes every loaded pit and deletes
//! nothing.

pub mod doc;
pub mod registry;
pub mod store;
pub mod sweeper;

pub use doc::PitDoc;
pub use registry::{
    Pit, PitError, PitRegistry, PitStats, PitUpdate, RegistryConfig, RegistryStats, validate_slug,
};
pub use store::{PitMetadata, PitStore};
pub use sweeper::{run_sweeper, sweep};
