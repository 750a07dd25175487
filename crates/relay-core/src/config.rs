//! Environment Configuration Loader
//!
//! Loads environment variables from `/etc/relay/environment` (or a file named
//! by `RELAY_ENV_FILE`) so the engine and the service share one source of
//! tunables. Existing variables always win over file entries.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_core::config::{get_config_int, load_environment};
//!
//! load_environment();
//! let timeout = get_config_int("RELAY_TOOL_TIMEOUT_MS", 30_000);
//! ```

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Paths checked in order when `RELAY_ENV_FILE` is not set
pub const ENV_FILE_PATHS: &[&str] = &["/etc/relay/environment", "/etc/relay.env", ".env"];

/// Load environment variables from the first configuration file found.
///
/// Returns the path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("RELAY_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

fn try_load_env_file(path: &str) -> Option<String> {
    let path_obj = Path::new(path);
    if !path_obj.exists() {
        return None;
    }

    match fs::read_to_string(path_obj) {
        Ok(content) => {
            let mut loaded_count = 0;
            let mut skipped_count = 0;

            for (key, value) in content.lines().filter_map(parse_env_line) {
                if std::env::var(&key).is_err() {
                    std::env::set_var(&key, &value);
                    loaded_count += 1;
                    debug!("Loaded: {}={}", key, redact(&key, &value));
                } else {
                    skipped_count += 1;
                    debug!("Skipped (already set): {}", key);
                }
            }

            info!(
                "Loaded {} environment variables from {} ({} skipped - already set)",
                loaded_count, path, skipped_count
            );
            Some(path.to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            None
        }
    }
}

fn redact<'a>(key: &str, value: &'a str) -> &'a str {
    if key.contains("KEY") || key.contains("TOKEN") || key.contains("SECRET") {
        "***"
    } else {
        value
    }
}

/// Parse a single environment line into a key-value pair.
///
/// Handles `KEY=VALUE`, `KEY="VALUE"` and `KEY='VALUE'`; comments and blank
/// lines yield `None`.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (key, value) = line.split_once('=')?;
    let key = key.trim().trim_start_matches("export ").trim();
    let value = value.trim();
    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Get a configuration value with a default.
pub fn get_config(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a boolean configuration value.
pub fn get_config_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default)
}

/// Get an integer configuration value.
pub fn get_config_int(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_line_simple() {
        let (k, v) = parse_env_line("FOO=bar").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar");
    }

    #[test]
    fn test_parse_env_line_quoted() {
        let (k, v) = parse_env_line("FOO=\"bar baz\"").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar baz");

        let (_, v) = parse_env_line("FOO='bar'").unwrap();
        assert_eq!(v, "bar");
    }

    #[test]
    fn test_parse_env_line_export_prefix() {
        let (k, v) = parse_env_line("export RELAY_TOOL_TIMEOUT_MS=500").unwrap();
        assert_eq!(k, "RELAY_TOOL_TIMEOUT_MS");
        assert_eq!(v, "500");
    }

    #[test]
    fn test_parse_env_line_skips_noise() {
        assert!(parse_env_line("").is_none());
        assert!(parse_env_line("# comment").is_none());
        assert!(parse_env_line("=value").is_none());
        assert!(parse_env_line("NO_EQUALS").is_none());
    }

    #[test]
    fn test_get_config_int_falls_back() {
        std::env::set_var("RELAY_TEST_INT_GARBAGE", "not-a-number");
        assert_eq!(get_config_int("RELAY_TEST_INT_GARBAGE", 7), 7);
        std::env::set_var("RELAY_TEST_INT_OK", " 42 ");
        assert_eq!(get_config_int("RELAY_TEST_INT_OK", 7), 42);
    }

    #[test]
    fn test_get_config_bool() {
        std::env::set_var("RELAY_TEST_BOOL", "YES");
        assert!(get_config_bool("RELAY_TEST_BOOL", false));
        assert!(!get_config_bool("RELAY_TEST_BOOL_MISSING", false));
    }
}
