//! Page metadata resolution.
//!
//! Fetches a link that is not obviously a media file and looks for the media
//! it points at: either the response itself is a gif/mp4, or the HTML carries
//! social-preview tags and structured data naming one.

use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};

use crate::config::ScanSettings;
use crate::error::{AntiCrashError, Result};
use crate::extractor::{has_media_extension, LinkPatterns};

/// Meta tags whose `content` attribute may name a media file, in lookup order.
const META_SELECTORS: [&str; 4] = [
    r#"meta[property^="og:video"]"#,
    r#"meta[name^="twitter:player"]"#,
    r#"meta[property^="og:image"]"#,
    r#"meta[name^="twitter:image"]"#,
];

/// Embedded structured-data blocks.
const LD_JSON_SELECTOR: &str = r#"script[type="application/ld+json"]"#;

/// Build the HTTP client shared by the resolver and the short-link client.
pub fn build_http_client(settings: &ScanSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(settings.user_agent.clone())
        .connect_timeout(settings.http_connect_timeout)
        .timeout(settings.http_timeout)
        .build()
        .map_err(AntiCrashError::Http)
}

/// How a response should be treated based on its `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// The URL itself is a gif or mp4.
    Media,
    /// An HTML page worth parsing.
    Html,
    /// Anything else.
    Other,
}

impl ContentKind {
    /// Classify a raw `Content-Type` header value.
    ///
    /// ```
    /// use anticrash::resolver::ContentKind;
    ///
    /// assert_eq!(ContentKind::from_header("image/gif"), ContentKind::Media);
    /// assert_eq!(ContentKind::from_header("text/html; charset=utf-8"), ContentKind::Html);
    /// assert_eq!(ContentKind::from_header("application/json"), ContentKind::Other);
    /// ```
    pub fn from_header(content_type: &str) -> Self {
        if content_type.contains("image/gif") || content_type.starts_with("video/mp4") {
            ContentKind::Media
        } else if content_type.contains("text/html") {
            ContentKind::Html
        } else {
            ContentKind::Other
        }
    }
}

/// Resolves page URLs to the media they embed.
pub struct MetadataResolver {
    client: reqwest::Client,
    patterns: LinkPatterns,
}

impl MetadataResolver {
    /// Create a new MetadataResolver.
    pub fn new(client: reqwest::Client, patterns: LinkPatterns) -> Self {
        Self { client, patterns }
    }

    /// Media URLs for `url`, or an empty list on any failure.
    pub async fn resolve(&self, url: &str) -> Vec<String> {
        match self.try_resolve(url).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Metadata resolution failed");
                Vec::new()
            }
        }
    }

    /// Fallible resolution used by [`MetadataResolver::resolve`].
    pub async fn try_resolve(&self, url: &str) -> Result<Vec<String>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AntiCrashError::HttpStatus(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        match ContentKind::from_header(&content_type) {
            ContentKind::Media => return Ok(vec![url.to_string()]),
            ContentKind::Other => {
                tracing::debug!(url = %url, content_type = %content_type, "Not a page or media");
                return Ok(Vec::new());
            }
            ContentKind::Html => {}
        }

        let body = response.text().await?;
        Ok(self.media_urls_in_html(&body))
    }

    /// Media URLs named by preview tags and structured data in an HTML document.
    ///
    /// Only values ending in `.mp4` or `.gif` are kept, deduplicated in order of
    /// first appearance.
    pub fn media_urls_in_html(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut candidates = Vec::new();

        for selector in META_SELECTORS {
            let Ok(selector) = Selector::parse(selector) else {
                continue;
            };
            candidates.extend(
                document
                    .select(&selector)
                    .filter_map(|el| el.value().attr("content"))
                    .map(str::to_string),
            );
        }

        if let Ok(selector) = Selector::parse(LD_JSON_SELECTOR) {
            for script in document.select(&selector) {
                let text: String = script.text().collect();
                candidates.extend(
                    self.patterns
                        .find_urls(&text)
                        .into_iter()
                        .map(str::to_string),
                );
            }
        }

        let mut media: Vec<String> = Vec::new();
        for candidate in candidates {
            if has_media_extension(&candidate) && !media.contains(&candidate) {
                media.push(candidate);
            }
        }
        media
    }
}
