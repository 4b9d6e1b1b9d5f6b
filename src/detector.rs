//! Crash-file signature detection.
//!
//! A normal decode reports the same pixel format and dimensions for every
//! frame. Files that crash client decoders make ffprobe emit changing
//! per-frame records (or changing diagnostics) before the decoder gives up.
//! Two known outputs are special-cased: a harmless parser warning that is
//! skipped, and a missing container index that ends the probe as negative.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::ScanSettings;
use crate::models::{LineVerdict, ProbeOutcome};
use crate::probe::ProbeSession;

/// Non-fatal parser warning that does not indicate instability.
const BENIGN_NOISE: &str = "invalid block label";

/// The file has no index and cannot be probed at all.
const MISSING_INDEX: &str = "moov atom not found";

/// Line-by-line state machine over merged probe output.
#[derive(Debug, Default)]
pub struct SignatureScanner {
    last_line: Option<String>,
}

impl SignatureScanner {
    /// Create a scanner that has seen no lines.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one output line.
    pub fn feed(&mut self, line: &str) -> LineVerdict {
        if line.is_empty() || line.contains(BENIGN_NOISE) {
            return LineVerdict::Continue;
        }

        if line.contains(MISSING_INDEX) {
            return LineVerdict::Unprobeable;
        }

        if self.last_line.as_deref().is_some_and(|last| last != line) {
            return LineVerdict::Crash;
        }

        self.last_line = Some(line.to_string());
        LineVerdict::Continue
    }

    /// Run a complete, already-collected stream through a fresh scanner.
    ///
    /// Returns the outcome and how many lines were consumed before it was
    /// reached.
    #[cfg(test)]
    pub(crate) fn scan<I, S>(lines: I) -> (ProbeOutcome, usize)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut scanner = Self::new();
        let mut consumed = 0;

        for line in lines {
            consumed += 1;
            match scanner.feed(line.as_ref()) {
                LineVerdict::Continue => {}
                LineVerdict::Crash => return (ProbeOutcome::Crash, consumed),
                LineVerdict::Unprobeable => return (ProbeOutcome::Unprobeable, consumed),
            }
        }

        (ProbeOutcome::Clean, consumed)
    }
}

/// Runs ffprobe against media URLs and applies the signature scanner.
#[derive(Debug, Clone)]
pub struct SignatureDetector {
    tool: PathBuf,
    timeout: Duration,
}

impl SignatureDetector {
    /// Create a detector from startup settings.
    pub fn new(settings: &ScanSettings) -> Self {
        Self {
            tool: settings.ffprobe_path.clone(),
            timeout: settings.probe_timeout,
        }
    }

    /// Whether `url` is a crash file. Never fails; anything short of a positive
    /// signature is `false`.
    pub async fn is_crash_file(&self, url: &str) -> bool {
        self.probe(url).await.is_crash()
    }

    /// Probe `url` and report the detailed outcome.
    pub async fn probe(&self, url: &str) -> ProbeOutcome {
        let mut session = match ProbeSession::spawn(&self.tool, url) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Could not start probe");
                return ProbeOutcome::Indeterminate;
            }
        };

        let mut scanner = SignatureScanner::new();
        let read = async {
            while let Some(line) = session.next_line().await {
                match scanner.feed(&line) {
                    LineVerdict::Continue => {}
                    verdict => return Some(verdict),
                }
            }
            None
        };
        let verdict = tokio::time::timeout(self.timeout, read).await;

        let outcome = match verdict {
            Ok(Some(LineVerdict::Crash)) => {
                session.cancel().await;
                ProbeOutcome::Crash
            }
            Ok(Some(LineVerdict::Unprobeable)) => {
                session.cancel().await;
                ProbeOutcome::Unprobeable
            }
            Ok(Some(LineVerdict::Continue)) | Ok(None) => {
                session.finish().await;
                ProbeOutcome::Clean
            }
            Err(_) => {
                tracing::warn!(
                    url = %url,
                    timeout_secs = self.timeout.as_secs(),
                    "Probe timed out"
                );
                session.cancel().await;
                ProbeOutcome::Indeterminate
            }
        };

        tracing::debug!(url = %url, outcome = ?outcome, "Probe finished");
        outcome
    }
}
