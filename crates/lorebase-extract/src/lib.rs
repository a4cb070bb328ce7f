//! Lorebase Extract — plain-text extraction from document sources.
//!
//! File and Text documents are parsed from disk by format; Link documents are
//! rendered in a headless browser with a plain HTTP fallback. Every path ends
//! in the same place: a whitespace-normalized text blob for the chunker.

pub mod file;
pub mod html;
pub mod web;

use async_trait::async_trait;
use tracing::debug;

use lorebase_core::{ContentType, Document, Error, ExtractSettings, Result};

/// Turns a document's source into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: &Document) -> Result<String>;
}

/// Default extractor over local files and remote pages.
pub struct Extractor {
    settings: ExtractSettings,
    http: reqwest::Client,
}

impl Extractor {
    pub fn new(settings: ExtractSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.http_timeout_secs))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { settings, http })
    }
}

#[async_trait]
impl TextExtractor for Extractor {
    async fn extract(&self, document: &Document) -> Result<String> {
        let text = match document.content_type {
            ContentType::Link => {
                web::extract_link(&self.http, &document.source, &self.settings).await
            }
            ContentType::File | ContentType::Text => file::extract_file(document).await,
        }
        .map_err(|e| Error::extraction(document.id, e))?;

        let text = normalize_whitespace(&text);
        debug!(
            "Extracted {} chars from document {} ({})",
            text.len(),
            document.id,
            document.title
        );
        Ok(text)
    }
}

/// Collapse Windows line endings, trailing spaces, and runs of blank lines.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.replace('\r', "").lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}
