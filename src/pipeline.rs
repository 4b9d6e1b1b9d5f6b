//! Crash scan pipeline orchestration.
//!
//! Composes the UrlExtractor and SignatureDetector: extract every candidate
//! from a message, then probe them in order until one is a crash file.

use tracing::Instrument;
use uuid::Uuid;

use crate::config::ScanSettings;
use crate::detector::SignatureDetector;
use crate::error::Result;
use crate::extractor::{LinkPatterns, MediaSource, UrlExtractor, WebMediaSource};
use crate::resolver::{build_http_client, MetadataResolver};
use crate::shortlink::ShortLinkClient;

/// Message-level crash scanner.
pub struct CrashScanner<S = WebMediaSource> {
    extractor: UrlExtractor<S>,
    detector: SignatureDetector,
}

impl CrashScanner<WebMediaSource> {
    /// Build the production scanner from startup settings.
    pub fn from_settings(settings: &ScanSettings) -> Result<Self> {
        let patterns = LinkPatterns::new()?;
        let client = build_http_client(settings)?;

        let source = WebMediaSource::new(
            MetadataResolver::new(client.clone(), patterns.clone()),
            ShortLinkClient::new(client, settings),
        );

        Ok(Self::new(
            UrlExtractor::new(patterns, source),
            SignatureDetector::new(settings),
        ))
    }
}

impl<S: MediaSource> CrashScanner<S> {
    /// Create a scanner from its parts.
    pub fn new(extractor: UrlExtractor<S>, detector: SignatureDetector) -> Self {
        Self {
            extractor,
            detector,
        }
    }

    /// The first crash-file URL carried by a message, if any.
    ///
    /// Never fails: lookups and probes that go wrong count as "no crash file".
    pub async fn check_message_for_crash_file(
        &self,
        text: &str,
        attachments: &[String],
    ) -> Option<String> {
        let span = tracing::debug_span!("scan", scan_id = %Uuid::new_v4());

        async move {
            let candidates = self.extractor.extract(text, attachments).await;
            tracing::debug!(count = candidates.len(), "Extracted candidate URLs");

            for url in candidates {
                if url.is_empty() {
                    continue;
                }

                if self.detector.is_crash_file(&url).await {
                    tracing::warn!(url = %url, "Crash file detected");
                    return Some(url);
                }
            }

            None
        }
        .instrument(span)
        .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serenity::async_trait;

    use crate::config::ScanSettings;
    use crate::detector::SignatureDetector;
    use crate::extractor::{LinkPatterns, MediaSource, UrlExtractor};
    use crate::pipeline::CrashScanner;
    use crate::test_support::fake_probe;

    /// Answers short-link lookups with a fixed list and records page lookups.
    #[derive(Default)]
    struct CannedSource {
        short_result: Vec<String>,
        pages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaSource for CannedSource {
        async fn resolve_page(&self, url: &str) -> Vec<String> {
            self.pages.lock().expect("lock").push(url.to_string());
            Vec::new()
        }

        async fn resolve_short_link(&self, _name: &str) -> Vec<String> {
            self.short_result.clone()
        }
    }

    /// Fake probe that logs each URL and reports a crash for URLs containing "bad".
    fn scanner(
        dir: &tempfile::TempDir,
        source: CannedSource,
    ) -> (CrashScanner<CannedSource>, std::path::PathBuf) {
        let log = dir.path().join("probed");
        let tool = fake_probe(
            dir,
            &format!(
                "echo \"$9\" >> '{}'\ncase \"$9\" in *bad*) printf 'a,1,1\\nb,2,2\\n';; *) printf 'a,1,1\\na,1,1\\n';; esac",
                log.display()
            ),
        );
        let settings = ScanSettings::new(tool).with_probe_timeout(Duration::from_secs(10));
        let scanner = CrashScanner::new(
            UrlExtractor::new(LinkPatterns::new().expect("patterns compile"), source),
            SignatureDetector::new(&settings),
        );
        (scanner, log)
    }

    fn probed(log: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn returns_first_crash_url_and_stops() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (scanner, log) = scanner(&dir, CannedSource::default());
        let attachments = vec![
            "https://cdn.x.io/good.mp4".to_string(),
            "https://cdn.x.io/bad1.gif".to_string(),
            "https://cdn.x.io/bad2.mp4".to_string(),
        ];

        let found = scanner.check_message_for_crash_file("", &attachments).await;

        assert_eq!(found.as_deref(), Some("https://cdn.x.io/bad1.gif"));
        assert_eq!(
            probed(&log),
            vec!["https://cdn.x.io/good.mp4", "https://cdn.x.io/bad1.gif"]
        );
    }

    #[tokio::test]
    async fn clean_message_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (scanner, _log) = scanner(&dir, CannedSource::default());

        let found = scanner
            .check_message_for_crash_file("just chatting, https://x.io/fine.mp4", &[])
            .await;

        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn empty_short_link_urls_are_not_probed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = CannedSource {
            short_result: vec!["https://giant.gfycat.com/Cat.mp4".to_string(), String::new()],
            ..Default::default()
        };
        let (scanner, log) = scanner(&dir, source);

        let found = scanner
            .check_message_for_crash_file("https://gfycat.com/Cat", &[])
            .await;

        assert_eq!(found, None);
        assert_eq!(probed(&log), vec!["https://giant.gfycat.com/Cat.mp4"]);
    }

    #[tokio::test]
    async fn page_links_are_resolved_before_probing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (scanner, log) = scanner(&dir, CannedSource::default());

        let found = scanner
            .check_message_for_crash_file("https://example.com/watch/bad", &[])
            .await;

        assert_eq!(found, None);
        assert_eq!(
            *scanner.extractor.source().pages.lock().expect("lock"),
            vec!["https://example.com/watch/bad".to_string()]
        );
        assert!(probed(&log).is_empty());
    }
}
