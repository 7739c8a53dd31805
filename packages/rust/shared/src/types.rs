//! Core domain types shared by the crawler, exporters and CLI.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DocsCrawlError;

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// A rendition a page can be produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Markdown,
    Html,
    Text,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [Self::Markdown, Self::Html, Self::Text];

    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => ".md",
            Self::Html => ".html",
            Self::Text => ".txt",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = DocsCrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "html" => Ok(Self::Html),
            "text" | "txt" => Ok(Self::Text),
            other => Err(DocsCrawlError::validation(format!(
                "unknown output format '{other}' (expected markdown, html or text)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one export run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PageContent
// ---------------------------------------------------------------------------

/// One scraped page, rendered in every requested format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    pub url: String,
    pub title: String,
    pub bodies: BTreeMap<OutputFormat, String>,
}

impl PageContent {
    pub fn body(&self, format: OutputFormat) -> Option<&str> {
        self.bodies.get(&format).map(String::as_str)
    }

    pub fn markdown(&self) -> Option<&str> {
        self.body(OutputFormat::Markdown)
    }
}

// ---------------------------------------------------------------------------
// Failures & archive metadata
// ---------------------------------------------------------------------------

/// A page that could not be fetched or converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub url: String,
    pub error: String,
}

/// The `metadata.json` entry stored inside every ZIP bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub session_id: SessionId,
    pub total_pages: usize,
    pub crawled_at: DateTime<Utc>,
    pub urls: Vec<String>,
    pub errors: Vec<PageFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_accepts_aliases() {
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("HTML".parse::<OutputFormat>().unwrap(), OutputFormat::Html);
        assert_eq!(" txt ".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("pdf".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn format_extensions() {
        let exts: Vec<_> = OutputFormat::ALL.iter().map(|f| f.extension()).collect();
        assert_eq!(exts, vec![".md", ".html", ".txt"]);
    }

    #[test]
    fn metadata_serialization_shape() {
        let meta = ArchiveMetadata {
            session_id: SessionId::new(),
            total_pages: 1,
            crawled_at: Utc::now(),
            urls: vec!["https://docs.example.com/guide".into()],
            errors: vec![PageFailure {
                url: "https://docs.example.com/broken".into(),
                error: "HTTP 500".into(),
            }],
        };
        let value = serde_json::to_value(&meta).expect("serialize");
        for key in ["session_id", "total_pages", "crawled_at", "urls", "errors"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["errors"][0]["error"], "HTTP 500");
    }

    #[test]
    fn page_content_body_lookup() {
        let page = PageContent {
            url: "https://docs.example.com/a".into(),
            title: "A".into(),
            bodies: BTreeMap::from([(OutputFormat::Markdown, "# A\n".to_string())]),
        };
        assert_eq!(page.markdown(), Some("# A\n"));
        assert_eq!(page.body(OutputFormat::Html), None);
    }
}
