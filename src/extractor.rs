//! Candidate URL extraction.
//!
//! Turns message text and attachment URLs into the ordered list of URLs worth
//! probing. Attachments are taken by extension, links in the text are either
//! used directly, resolved through the short-link API, or handed to the
//! metadata resolver.

use regex::Regex;
use serenity::async_trait;

use crate::error::Result;
use crate::resolver::MetadataResolver;
use crate::shortlink::ShortLinkClient;

/// Generic link pattern shared by text scanning and structured-data scanning.
pub const URL_PATTERN: &str = r"(https?)://[A-Za-z0-9/._-]+";

/// First path segment of a short link.
const SHORT_NAME_PATTERN: &str = r"/([A-Za-z0-9]+)";

/// Short-link gif hosting domain.
pub const SHORTLINK_DOMAIN: &str = "gfycat.com";

/// Direct-file subdomain of the short-link host; already a media URL.
const SHORTLINK_GIANT_DOMAIN: &str = "giant.gfycat.com";

/// Iframe embed path of the short-link host.
const SHORTLINK_IFRAME_PATH: &str = "gfycat.com/ifr/";

/// Whether a URL ends in one of the probed media extensions.
///
/// The match is case-sensitive.
pub fn has_media_extension(url: &str) -> bool {
    url.ends_with(".gif") || url.ends_with(".mp4")
}

/// Compiled link patterns, built once at startup.
#[derive(Debug, Clone)]
pub struct LinkPatterns {
    url: Regex,
    short_name: Regex,
}

impl LinkPatterns {
    /// Compile the link patterns.
    pub fn new() -> Result<Self> {
        Ok(Self {
            url: Regex::new(URL_PATTERN)?,
            short_name: Regex::new(SHORT_NAME_PATTERN)?,
        })
    }

    /// All link matches in `text`, in order of appearance.
    pub fn find_urls<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.url.find_iter(text).map(|m| m.as_str()).collect()
    }

    /// Decide how a matched link should be handled.
    pub fn classify<'a>(&self, link: &'a str) -> LinkKind<'a> {
        if link.contains(SHORTLINK_DOMAIN)
            && !link.contains(SHORTLINK_GIANT_DOMAIN)
            && !link.contains(SHORTLINK_IFRAME_PATH)
        {
            // Text after the first ".com", so "www.gfycat.com/Name" works too
            let name = link
                .split(".com")
                .nth(1)
                .and_then(|rest| self.short_name.captures(rest))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str());
            return LinkKind::ShortLink(name);
        }

        if has_media_extension(link) {
            LinkKind::Direct
        } else {
            LinkKind::NeedsResolution
        }
    }
}

/// Classification of one matched link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind<'a> {
    /// Short-link host page; carries the short name if one was found.
    ShortLink(Option<&'a str>),
    /// Already a direct media URL.
    Direct,
    /// Some other page that may embed media.
    NeedsResolution,
}

/// Network-backed lookups the extractor depends on.
///
/// Implementations never fail: any error yields an empty list.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Media URLs embedded in (or served at) a page URL.
    async fn resolve_page(&self, url: &str) -> Vec<String>;

    /// Media URLs for a short-link name, mp4 first then gif.
    async fn resolve_short_link(&self, name: &str) -> Vec<String>;
}

/// Production media source backed by HTTP.
pub struct WebMediaSource {
    resolver: MetadataResolver,
    short_links: ShortLinkClient,
}

impl WebMediaSource {
    /// Create a new WebMediaSource.
    pub fn new(resolver: MetadataResolver, short_links: ShortLinkClient) -> Self {
        Self {
            resolver,
            short_links,
        }
    }
}

#[async_trait]
impl MediaSource for WebMediaSource {
    async fn resolve_page(&self, url: &str) -> Vec<String> {
        self.resolver.resolve(url).await
    }

    async fn resolve_short_link(&self, name: &str) -> Vec<String> {
        self.short_links.resolve(name).await
    }
}

/// Extracts candidate media URLs from a message.
pub struct UrlExtractor<S> {
    patterns: LinkPatterns,
    source: S,
}

impl<S: MediaSource> UrlExtractor<S> {
    /// Create a new UrlExtractor.
    pub fn new(patterns: LinkPatterns, source: S) -> Self {
        Self { patterns, source }
    }

    /// The media source used for lookups.
    #[cfg(test)]
    pub(crate) fn source(&self) -> &S {
        &self.source
    }

    /// Produce the ordered candidate list for a message.
    ///
    /// Attachments come first, then text links in order of appearance. Results
    /// from different sources are not deduplicated.
    pub async fn extract(&self, text: &str, attachments: &[String]) -> Vec<String> {
        let mut urls: Vec<String> = attachments
            .iter()
            .filter(|url| has_media_extension(url))
            .cloned()
            .collect();

        for link in self.patterns.find_urls(text) {
            match self.patterns.classify(link) {
                LinkKind::ShortLink(Some(name)) => {
                    let found = self.source.resolve_short_link(name).await;
                    tracing::debug!(link = %link, name = %name, count = found.len(), "Resolved short link");
                    urls.extend(found);
                }
                LinkKind::ShortLink(None) => {
                    tracing::debug!(link = %link, "Short link without a name, skipping");
                }
                LinkKind::NeedsResolution => {
                    let found = self.source.resolve_page(link).await;
                    tracing::debug!(link = %link, count = found.len(), "Resolved page metadata");
                    urls.extend(found);
                }
                LinkKind::Direct => urls.push(link.to_string()),
            }
        }

        urls
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serenity::async_trait;

    use crate::extractor::{has_media_extension, LinkKind, LinkPatterns, MediaSource, UrlExtractor};

    /// Records every lookup and answers with canned results.
    #[derive(Default)]
    struct RecordingSource {
        pages: Mutex<Vec<String>>,
        short_names: Mutex<Vec<String>>,
        page_result: Vec<String>,
        short_result: Vec<String>,
    }

    #[async_trait]
    impl MediaSource for RecordingSource {
        async fn resolve_page(&self, url: &str) -> Vec<String> {
            self.pages.lock().expect("lock").push(url.to_string());
            self.page_result.clone()
        }

        async fn resolve_short_link(&self, name: &str) -> Vec<String> {
            self.short_names.lock().expect("lock").push(name.to_string());
            self.short_result.clone()
        }
    }

    fn extractor(source: RecordingSource) -> UrlExtractor<RecordingSource> {
        UrlExtractor::new(LinkPatterns::new().expect("patterns compile"), source)
    }

    #[test]
    fn media_extension_is_case_sensitive() {
        assert!(has_media_extension("https://a.b/c.mp4"));
        assert!(has_media_extension("https://a.b/c.gif"));
        assert!(!has_media_extension("https://a.b/c.MP4"));
        assert!(!has_media_extension("https://a.b/c.webm"));
    }

    #[test]
    fn signed_cdn_attachment_urls_are_not_candidates() {
        let signed = "https://cdn.discordapp.com/attachments/1/2/clip.mp4?ex=65f1&is=65e0&hm=ab12&";

        assert!(!has_media_extension(signed));
        assert!(has_media_extension("https://cdn.discordapp.com/attachments/1/2/clip.mp4"));
    }

    #[test]
    fn url_pattern_stops_at_query_string() {
        let patterns = LinkPatterns::new().expect("patterns compile");
        let found = patterns.find_urls("see https://x.io/v.mp4?size=large and http://y.io/p");
        assert_eq!(found, vec!["https://x.io/v.mp4", "http://y.io/p"]);
    }

    #[test]
    fn classify_short_links() {
        let patterns = LinkPatterns::new().expect("patterns compile");
        assert_eq!(
            patterns.classify("https://gfycat.com/HappyLittleCat"),
            LinkKind::ShortLink(Some("HappyLittleCat"))
        );
        assert_eq!(
            patterns.classify("https://www.gfycat.com/Name-extra"),
            LinkKind::ShortLink(Some("Name"))
        );
        assert_eq!(
            patterns.classify("https://gfycat.com"),
            LinkKind::ShortLink(None)
        );
    }

    #[test]
    fn classify_short_link_exclusions() {
        let patterns = LinkPatterns::new().expect("patterns compile");
        assert_eq!(
            patterns.classify("https://giant.gfycat.com/Name.mp4"),
            LinkKind::Direct
        );
        assert_eq!(
            patterns.classify("https://gfycat.com/ifr/Name"),
            LinkKind::NeedsResolution
        );
    }

    #[tokio::test]
    async fn attachments_with_media_extensions_need_no_network() {
        let extractor = extractor(RecordingSource::default());
        let attachments = vec![
            "https://cdn.discordapp.com/a/1/clip.mp4".to_string(),
            "https://cdn.discordapp.com/a/1/notes.txt".to_string(),
            "https://cdn.discordapp.com/a/1/funny.gif".to_string(),
        ];

        let urls = extractor.extract("", &attachments).await;

        assert_eq!(
            urls,
            vec![
                "https://cdn.discordapp.com/a/1/clip.mp4",
                "https://cdn.discordapp.com/a/1/funny.gif"
            ]
        );
        assert!(extractor.source.pages.lock().expect("lock").is_empty());
        assert!(extractor.source.short_names.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn short_link_returns_both_urls_in_order() {
        let extractor = extractor(RecordingSource {
            short_result: vec![
                "https://giant.gfycat.com/Cat.mp4".to_string(),
                String::new(),
            ],
            ..Default::default()
        });

        let urls = extractor
            .extract("look https://gfycat.com/Cat lol", &[])
            .await;

        assert_eq!(urls, vec!["https://giant.gfycat.com/Cat.mp4", ""]);
        assert_eq!(
            *extractor.source.short_names.lock().expect("lock"),
            vec!["Cat".to_string()]
        );
    }

    #[tokio::test]
    async fn one_short_link_call_per_match() {
        let extractor = extractor(RecordingSource::default());

        extractor
            .extract("https://gfycat.com/One https://gfycat.com/Two https://gfycat.com/One", &[])
            .await;

        assert_eq!(
            *extractor.source.short_names.lock().expect("lock"),
            vec!["One".to_string(), "Two".to_string(), "One".to_string()]
        );
    }

    #[tokio::test]
    async fn non_media_links_go_to_resolver() {
        let extractor = extractor(RecordingSource {
            page_result: vec!["https://media.example.com/clip.mp4".to_string()],
            ..Default::default()
        });

        let urls = extractor
            .extract("https://example.com/watch/123 and https://x.io/direct.gif", &[])
            .await;

        assert_eq!(
            urls,
            vec!["https://media.example.com/clip.mp4", "https://x.io/direct.gif"]
        );
        assert_eq!(
            *extractor.source.pages.lock().expect("lock"),
            vec!["https://example.com/watch/123".to_string()]
        );
    }

    #[tokio::test]
    async fn duplicates_across_sources_are_kept() {
        let extractor = extractor(RecordingSource::default());
        let attachments = vec!["https://x.io/a.gif".to_string()];

        let urls = extractor.extract("https://x.io/a.gif", &attachments).await;

        assert_eq!(urls, vec!["https://x.io/a.gif", "https://x.io/a.gif"]);
    }
}
