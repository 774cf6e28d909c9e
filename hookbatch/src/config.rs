//! Configuration management via environment variables
//!
//! Provides helper functions for reading environment variables with fallback
//! to deprecated variable names with warning logs, and the loader that builds
//! the server configuration from them.

use hookbatch_common::config::ServerConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Get an environment variable with fallback to a deprecated name
///
/// If the new variable name is set, returns its value.
/// If only the old (deprecated) variable name is set, returns its value
/// and logs a deprecation warning.
///
/// # Example
/// ```
/// use hookbatch::config::get_env_with_fallback;
///
/// let port = get_env_with_fallback("HOOKBATCH_PORT", "PORT");
/// ```
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// Get an environment variable with fallback and default value
pub fn get_env_with_fallback_or(new_name: &str, old_name: &str, default: &str) -> String {
    get_env_with_fallback(new_name, old_name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable with fallback, parsing to a specific type
///
/// Returns `default` if neither variable is set or parsing fails.
pub fn get_env_with_fallback_parse<T: std::str::FromStr>(
    new_name: &str,
    old_name: &str,
    default: T,
) -> T {
    get_env_with_fallback(new_name, old_name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Load the server configuration from environment variables.
///
/// | Variable | Deprecated fallback | Default |
/// |---|---|---|
/// | `HOOKBATCH_HOST` | `HOST` | `0.0.0.0` |
/// | `HOOKBATCH_PORT` | `PORT` | `8085` |
/// | `HOOKBATCH_CONFIG_DIR` | `CONFIG_DIR` | `./hooks` |
/// | `HOOKBATCH_DELIVERY_TIMEOUT_SECS` | `DELIVERY_TIMEOUT_SECS` | `30` |
pub fn load_server_config() -> ServerConfig {
    let defaults = ServerConfig::default();
    ServerConfig {
        host: get_env_with_fallback_or("HOOKBATCH_HOST", "HOST", &defaults.host),
        port: get_env_with_fallback_parse("HOOKBATCH_PORT", "PORT", defaults.port),
        config_dir: get_env_with_fallback_or(
            "HOOKBATCH_CONFIG_DIR",
            "CONFIG_DIR",
            &defaults.config_dir,
        ),
        delivery_timeout_secs: get_env_with_fallback_parse(
            "HOOKBATCH_DELIVERY_TIMEOUT_SECS",
            "DELIVERY_TIMEOUT_SECS",
            defaults.delivery_timeout_secs,
        ),
    }
}

/// Directory holding the endpoint documents.
pub fn config_dir(config: &ServerConfig) -> PathBuf {
    PathBuf::from(&config.config_dir)
}

/// Timeout applied to a single batch delivery.
pub fn delivery_timeout(config: &ServerConfig) -> Duration {
    Duration::from_secs(config.delivery_timeout_secs)
}
