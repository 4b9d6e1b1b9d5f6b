//! Error types for AntiCrash.
//!
//! All errors are explicitly typed using thiserror. The scan core maps these
//! to empty or negative results at its public boundary; only startup and the
//! Discord layer ever surface them.

use thiserror::Error;

/// Central error type for all AntiCrash operations.
#[derive(Debug, Error)]
pub enum AntiCrashError {
    /// Discord API error from serenity.
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<serenity::Error>),

    /// Configuration error (missing env vars, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request error while resolving media.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from a fetched page or API.
    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Regex pattern compilation error.
    #[error("Regex pattern error: {0}")]
    RegexPattern(#[from] regex::Error),

    /// IO error talking to the probe subprocess.
    #[error("IO error: {0}")]
    Io(String),

    /// The media inspection tool could not be found or started.
    #[error("Probe tool unavailable: {0}")]
    ProbeUnavailable(String),
}

impl AntiCrashError {
    /// Whether this error must abort startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::ProbeUnavailable(_))
    }

    /// Get user-friendly error message (hides internal details)
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::DiscordApi(_) => "Discord service temporarily unavailable",
            Self::Config(_) => "Service configuration error",
            Self::Http(_) | Self::HttpStatus(_) => "Network error, please try again",
            Self::Json(_) => "Data format error",
            Self::RegexPattern(_) => "Invalid pattern configuration",
            Self::Io(_) | Self::ProbeUnavailable(_) => "Media probe unavailable",
        }
    }
}

impl From<std::io::Error> for AntiCrashError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Result type alias for AntiCrash operations.
pub type Result<T> = std::result::Result<T, AntiCrashError>;
