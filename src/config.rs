//! Configuration loading from environment.
//!
//! Reads the bot token and feature toggles from environment variables and
//! resolves the probe tool once at startup. Everything the scan core needs is
//! collected into an immutable [`ScanSettings`] value.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AntiCrashError, Result};

/// Product name sent in the User-Agent header and shown in embeds.
pub const PRODUCT_NAME: &str = "AntiCrash";

/// Default short-link API endpoint; the short name is appended as a path segment.
pub const DEFAULT_SHORTLINK_API_URL: &str = "https://api.gfycat.com/v1/gfycats";

/// Default total HTTP timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP connect timeout in seconds.
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default upper bound on a single probe run in seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

/// Default short-link API quota.
pub const DEFAULT_SHORTLINK_REQUESTS_PER_MINUTE: u32 = 60;

/// Default health check port.
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Build the `AntiCrash/<version>` User-Agent value.
pub fn user_agent() -> String {
    format!("{}/{}", PRODUCT_NAME, env!("CARGO_PKG_VERSION"))
}

/// Main configuration for the AntiCrash bot.
#[derive(Debug, Clone)]
pub struct AntiCrashConfig {
    /// Discord bot token.
    pub discord_token: String,
    /// Reply to offending messages before deleting them.
    pub reply_to_message: bool,
    /// Channel that receives detection log embeds (optional).
    pub log_channel_id: Option<u64>,
    /// Port for the health check server.
    pub health_port: u16,
    /// Settings shared by the extractor, resolver and detector.
    pub scan: ScanSettings,
}

/// Immutable settings for the scan core, built once at startup.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// User-Agent header for every outbound request.
    pub user_agent: String,
    /// Absolute path of the ffprobe executable.
    pub ffprobe_path: PathBuf,
    /// Total timeout for each HTTP request.
    pub http_timeout: Duration,
    /// Connect timeout for each HTTP request.
    pub http_connect_timeout: Duration,
    /// Upper bound on a single probe run.
    pub probe_timeout: Duration,
    /// Base URL of the short-link API.
    pub shortlink_api_url: String,
    /// Short-link API quota.
    pub shortlink_requests_per_minute: u32,
}

impl ScanSettings {
    /// Create settings with default timeouts for the given probe path.
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            user_agent: user_agent(),
            ffprobe_path: ffprobe_path.into(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            http_connect_timeout: Duration::from_secs(DEFAULT_HTTP_CONNECT_TIMEOUT_SECS),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            shortlink_api_url: DEFAULT_SHORTLINK_API_URL.to_string(),
            shortlink_requests_per_minute: DEFAULT_SHORTLINK_REQUESTS_PER_MINUTE,
        }
    }

    /// Override the short-link API base URL.
    pub fn with_shortlink_api_url(mut self, url: impl Into<String>) -> Self {
        self.shortlink_api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

impl AntiCrashConfig {
    /// Load configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `DISCORD_TOKEN`: Discord bot token
    ///
    /// Optional environment variables:
    /// - `REPLY_TO_MESSAGE`: Reply before deleting (default: false)
    /// - `LOG_CHANNEL_ID`: Channel ID for detection logs
    /// - `FFPROBE_PATH`: Explicit ffprobe location (default: looked up on `PATH`)
    /// - `HTTP_TIMEOUT_SECS`: Total HTTP timeout (default: 10)
    /// - `HTTP_CONNECT_TIMEOUT_SECS`: HTTP connect timeout (default: 5)
    /// - `PROBE_TIMEOUT_SECS`: Probe run timeout (default: 30)
    /// - `SHORTLINK_API_URL`: Short-link API base URL
    /// - `SHORTLINK_REQUESTS_PER_MINUTE`: Short-link API quota (default: 60)
    /// - `HEALTH_PORT`: Health check port (default: 8080)
    pub fn from_env() -> Result<Self> {
        let discord_token = env::var("DISCORD_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AntiCrashError::Config("DISCORD_TOKEN not set".to_string()))?;

        let reply_to_message = env::var("REPLY_TO_MESSAGE")
            .ok()
            .and_then(|s| parse_bool(&s))
            .unwrap_or(false);

        let log_channel_id = env::var("LOG_CHANNEL_ID")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok());

        let ffprobe_path = locate_ffprobe(env::var("FFPROBE_PATH").ok().as_deref())?;

        let scan = ScanSettings {
            user_agent: user_agent(),
            ffprobe_path,
            http_timeout: Duration::from_secs(env_or(
                "HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )),
            http_connect_timeout: Duration::from_secs(env_or(
                "HTTP_CONNECT_TIMEOUT_SECS",
                DEFAULT_HTTP_CONNECT_TIMEOUT_SECS,
            )),
            probe_timeout: Duration::from_secs(env_or(
                "PROBE_TIMEOUT_SECS",
                DEFAULT_PROBE_TIMEOUT_SECS,
            )),
            shortlink_api_url: DEFAULT_SHORTLINK_API_URL.to_string(),
            shortlink_requests_per_minute: env_or(
                "SHORTLINK_REQUESTS_PER_MINUTE",
                DEFAULT_SHORTLINK_REQUESTS_PER_MINUTE,
            ),
        };

        let scan = match env::var("SHORTLINK_API_URL") {
            Ok(url) if !url.trim().is_empty() => scan.with_shortlink_api_url(url.trim()),
            _ => scan,
        };

        Ok(Self {
            discord_token,
            reply_to_message,
            log_channel_id,
            health_port: env_or("HEALTH_PORT", DEFAULT_HEALTH_PORT),
            scan,
        })
    }
}

/// Resolve the ffprobe executable, either from an explicit path or from `PATH`.
pub fn locate_ffprobe(explicit: Option<&str>) -> Result<PathBuf> {
    match explicit.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => which::which(Path::new(path)).map_err(|e| {
            AntiCrashError::ProbeUnavailable(format!("FFPROBE_PATH {}: {}", path, e))
        }),
        None => which::which("ffprobe").map_err(|e| {
            AntiCrashError::ProbeUnavailable(format!("Couldn't get ffprobe path: {}", e))
        }),
    }
}

/// Parse a boolean toggle such as `true`, `yes`, `1` or `off`.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read and parse an environment variable, falling back to a default.
fn env_or<T: FromStr>(var_name: &str, default: T) -> T {
    env::var(var_name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}


#[cfg(test)]
mod property_tests {
    use crate::config::parse_bool;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Arbitrary words that are not recognised toggles never parse.
        #[test]
        fn prop_unknown_words_do_not_parse(word in "[a-z]{6,12}") {
            prop_assume!(!matches!(word.as_str(), "1" | "true" | "yes" | "on" | "0" | "false" | "no" | "off"));
            prop_assert_eq!(parse_bool(&word), None);
        }

        /// Case and surrounding whitespace never change the result.
        #[test]
        fn prop_case_insensitive(value in prop_oneof![Just("true"), Just("false"), Just("yes"), Just("no")], pad in " {0,3}") {
            let mixed = format!("{}{}{}", pad, value.to_uppercase(), pad);
            prop_assert_eq!(parse_bool(&mixed), parse_bool(value));
        }
    }
}
