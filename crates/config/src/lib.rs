//! Configuration for the welld daemon: file discovery, `${VAR}`
//! substitution, and environment overrides.

pub mod env;
pub mod loader;
pub mod schema;

pub use env::{apply_env_overrides, substitute_env};
pub use loader::{discover_and_load, find_config_in, load_config};
pub use schema::{PitsConfig, ServerConfig, WellConfig};
