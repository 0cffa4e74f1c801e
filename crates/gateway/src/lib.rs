//! Transport gateway: the HTTP + WebSocket surface over the pit registry.
//!
//! Lifecycle per attachment:
//! 1. Validate the slug and `ensure` the pit (single-flight load)
//! 2. `increment_connections`
//! 3. Relay loop: every binary frame is an opaque document update, merged
//!    into the authoritative doc and fanned out to the pit's other
//!    attachments
//! 4. `decrement_connections` on close, which saves on last-out
//!
//! Merge semantics live entirely in the document library; frames are never
//! inspected here.

pub mod server;
pub mod ws;
