#[cfg(test)]
mod tests;

use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulldown_cmark::{Event, Parser, TagEnd};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{RagError, Result};

const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 30;

/// Stable identity of a loaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derive an id from a URL so that repeated hits on the same page share identity
    #[inline]
    pub fn from_url(url: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes()))
    }

    /// Derive an id from a search hit's page and content, so that the same
    /// passage shares identity while different passages of one page do not
    #[inline]
    pub fn from_web_hit(url: &str, text: &str) -> Self {
        let page = Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes());
        Self(Uuid::new_v5(&page, text.as_bytes()))
    }
}

impl Default for DocumentId {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Extracted text plus the location it was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    id: DocumentId,
    source: Arc<str>,
    text: Arc<str>,
}

impl Document {
    #[inline]
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_id(DocumentId::new(), source, text)
    }

    #[inline]
    pub fn with_id(id: DocumentId, source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            source: Arc::from(source.into()),
            text: Arc::from(text.into()),
        }
    }

    #[inline]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Slice the document into a segment. Returns `None` if the byte range is
    /// out of bounds or does not fall on char boundaries.
    #[inline]
    pub fn segment(&self, range: Range<usize>) -> Option<Segment> {
        self.text.get(range.clone())?;
        Some(Segment {
            id: SegmentId {
                document: self.id,
                start: range.start,
                end: range.end,
            },
            source: Arc::clone(&self.source),
            document_text: Arc::clone(&self.text),
        })
    }

    /// The whole document as a single segment
    #[inline]
    pub fn as_segment(&self) -> Segment {
        Segment {
            id: SegmentId {
                document: self.id,
                start: 0,
                end: self.text.len(),
            },
            source: Arc::clone(&self.source),
            document_text: Arc::clone(&self.text),
        }
    }
}

/// Identity of a segment: its document and byte range within that document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId {
    pub document: DocumentId,
    pub start: usize,
    pub end: usize,
}

/// An immutable slice of a document's text.
///
/// The segment shares the document's text buffer and carries the document's
/// source label for provenance display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    id: SegmentId,
    source: Arc<str>,
    document_text: Arc<str>,
}

impl Segment {
    #[inline]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn text(&self) -> &str {
        self.document_text
            .get(self.id.start..self.id.end)
            .unwrap_or_default()
    }

    /// Length in chars
    #[inline]
    pub fn char_len(&self) -> usize {
        self.text().chars().count()
    }

    #[inline]
    pub fn byte_range(&self) -> Range<usize> {
        self.id.start..self.id.end
    }
}

/// Formats the loader knows how to turn into plain text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Html,
}

impl DocumentFormat {
    #[inline]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "txt" | "text" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }

    #[inline]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "text/plain" => Some(Self::PlainText),
            "text/markdown" | "text/x-markdown" => Some(Self::Markdown),
            "text/html" | "application/xhtml+xml" => Some(Self::Html),
            _ => None,
        }
    }

    #[inline]
    pub fn extract_text(self, raw: &str) -> String {
        match self {
            Self::PlainText => raw.to_string(),
            Self::Markdown => markdown_to_text(raw),
            Self::Html => html_to_text(raw),
        }
    }
}

/// Strip Markdown syntax, keeping block boundaries as blank lines so the
/// chunker can still split on paragraphs.
fn markdown_to_text(markdown: &str) -> String {
    let mut text = String::with_capacity(markdown.len());

    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak => text.push(' '),
            Event::HardBreak => text.push('\n'),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote(_),
            ) => text.push_str("\n\n"),
            _ => {}
        }
    }

    text.trim().to_string()
}

fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let blocks = Selector::parse("p, h1, h2, h3, h4, h5, h6, li, pre, blockquote, td")
        .map(|selector| {
            document
                .select(&selector)
                .map(|element| collapse_whitespace(&element.text().collect::<String>()))
                .filter(|block| !block.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if blocks.is_empty() {
        return collapse_whitespace(&document.root_element().text().collect::<String>());
    }

    blocks.join("\n\n")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Produces documents from a path or URL
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, location: &str) -> Result<Document>;
}

/// Loads local text, Markdown and HTML files, and fetches `http(s)` URLs
#[derive(Debug, Clone)]
pub struct DefaultDocumentLoader {
    agent: ureq::Agent,
}

impl Default for DefaultDocumentLoader {
    #[inline]
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS))
    }
}

impl DefaultDocumentLoader {
    #[inline]
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent }
    }

    async fn load_path(&self, location: &str) -> Result<Document> {
        let path = Path::new(location);

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(RagError::NotFound(location.to_string()));
        }

        let format = DocumentFormat::from_path(path)
            .ok_or_else(|| RagError::UnsupportedFormat(location.to_string()))?;

        let raw = tokio::fs::read_to_string(path).await?;
        debug!("Loaded {} bytes from {}", raw.len(), location);

        Ok(Document::new(location, format.extract_text(&raw)))
    }

    async fn load_url(&self, location: &str) -> Result<Document> {
        let agent = self.agent.clone();
        let url = location.to_string();

        let (content_type, body) = tokio::task::spawn_blocking(move || fetch(&agent, &url))
            .await
            .map_err(|e| RagError::Other(e.into()))??;

        let format = DocumentFormat::from_content_type(&content_type)
            .ok_or_else(|| RagError::UnsupportedFormat(format!("{} ({})", location, content_type)))?;

        debug!("Fetched {} bytes of {} from {}", body.len(), content_type, location);

        Ok(Document::with_id(
            DocumentId::from_url(location),
            location,
            format.extract_text(&body),
        ))
    }
}

fn fetch(agent: &ureq::Agent, url: &str) -> Result<(String, String)> {
    let mut response = agent.get(url).call().map_err(|error| match error {
        ureq::Error::StatusCode(404 | 410) => RagError::NotFound(url.to_string()),
        other => RagError::Other(anyhow::anyhow!("Failed to fetch {}: {}", url, other)),
    })?;

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("text/plain")
        .to_string();

    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to read body of {}: {}", url, e)))?;

    Ok((content_type, body))
}

#[async_trait]
impl DocumentLoader for DefaultDocumentLoader {
    #[inline]
    async fn load(&self, location: &str) -> Result<Document> {
        if location.starts_with("http://") || location.starts_with("https://") {
            self.load_url(location).await
        } else {
            self.load_path(location).await
        }
    }
}
