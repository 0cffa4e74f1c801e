//! Environment handling: `${VAR}` substitution inside config files, plus
//! the override variables recognized at startup (`HOST`, `PORT`,
//! `PITS_DIR`, `PIT_TTL_MINUTES`, `CLEANUP_INTERVAL_MINUTES`).

use tracing::warn;

use crate::schema::WellConfig;

/// Replace `${ENV_VAR}` placeholders in raw config text.
///
/// Unresolvable or malformed placeholders are left as written.
pub fn substitute_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    },
                }
                rest = &after[end + 1..];
            },
            _ => {
                out.push_str("${");
                rest = after;
            },
        }
    }
    out.push_str(rest);
    out
}

/// Apply recognized environment variables on top of `config`.
///
/// TTL and cleanup interval are given in minutes. Unparseable numeric
/// values are logged and ignored.
pub fn apply_env_overrides(config: &mut WellConfig) {
    if let Ok(host) = std::env::var("HOST")
        && !host.is_empty()
    {
        config.server.host = host;
    }
    if let Some(port) = parse_var::<u16>("PORT") {
        config.server.port = port;
    }
    if let Ok(dir) = std::env::var("PITS_DIR")
        && !dir.is_empty()
    {
        config.pits.dir = dir;
    }
    if let Some(minutes) = parse_var::<u64>("PIT_TTL_MINUTES") {
        config.pits.ttl_ms = minutes * 60 * 1000;
    }
    if let Some(minutes) = parse_var::<u64>("CLEANUP_INTERVAL_MINUTES") {
        config.pits.cleanup_interval_ms = minutes * 60 * 1000;
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable environment override");
            None
        },
    }
}
