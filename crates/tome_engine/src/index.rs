use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use tome_core::{ChapterEntry, Work};
use tome_logging::{tome_debug, tome_warn};

use crate::charset::decode_text;
use crate::decode::DecodeError;
use crate::endpoint::ID_PLACEHOLDER;
use crate::{FailureKind, FetchError, Transport};

pub const DEFAULT_PAGE_TEMPLATE: &str = "https://fanqienovel.com/page/{id}";
pub const UNKNOWN_AUTHOR: &str = "unknown author";

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("index page unreadable: {0}")]
    Decode(#[from] DecodeError),
    #[error("index page for {work_id} has no title")]
    MissingTitle { work_id: String },
    #[error("index page for {work_id} lists no chapters")]
    NoChapters { work_id: String },
}

/// Source of work metadata and the canonical chapter list.
#[async_trait::async_trait]
pub trait WorkIndex: Send + Sync {
    async fn fetch_work(&self, work_id: &str) -> Result<Work, IndexError>;
}

/// Reads the work's public landing page.
pub struct SiteIndex {
    transport: Arc<dyn Transport>,
    page_template: String,
}

impl SiteIndex {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_template(transport, DEFAULT_PAGE_TEMPLATE)
    }

    pub fn with_template(transport: Arc<dyn Transport>, page_template: impl Into<String>) -> Self {
        Self {
            transport,
            page_template: page_template.into(),
        }
    }

    fn page_url(&self, work_id: &str) -> Result<String, FetchError> {
        let encoded: String = url::form_urlencoded::byte_serialize(work_id.as_bytes()).collect();
        let url = self.page_template.replace(ID_PLACEHOLDER, &encoded);
        url::Url::parse(&url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        Ok(url)
    }
}

#[async_trait::async_trait]
impl WorkIndex for SiteIndex {
    async fn fetch_work(&self, work_id: &str) -> Result<Work, IndexError> {
        let url = self.page_url(work_id)?;
        tome_debug!("Fetching index {}", url);
        let output = self.transport.get(&url).await?;
        let html = decode_text(&output.bytes, output.metadata.content_type.as_deref())?;
        parse_work_page(work_id, &html)
    }
}

/// Parses a work landing page into a [`Work`].
///
/// Chapter ids are the last path segment of each chapter link; entries
/// without a link are skipped and indexes stay dense.
pub fn parse_work_page(work_id: &str, html: &str) -> Result<Work, IndexError> {
    let doc = Html::parse_document(html);

    let title = select_first(&doc, "h1")
        .map(|node| collapsed_text(&node))
        .filter(|title| !title.is_empty())
        .ok_or_else(|| IndexError::MissingTitle {
            work_id: work_id.to_string(),
        })?;

    let author = select_first(&doc, "div.author-name span.author-name-text")
        .map(|node| collapsed_text(&node))
        .filter(|author| !author.is_empty())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    let description = select_first(&doc, "div.page-abstract-content p")
        .map(|node| {
            node.text()
                .collect::<String>()
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    let entries = chapter_entries(&doc);
    if entries.is_empty() {
        return Err(IndexError::NoChapters {
            work_id: work_id.to_string(),
        });
    }
    tome_debug!("Index for {} lists {} chapters", work_id, entries.len());

    Ok(Work::new(work_id, title, author, description, entries))
}

fn chapter_entries(doc: &Html) -> Vec<ChapterEntry> {
    let (Ok(item_sel), Ok(link_sel)) = (
        Selector::parse("div.chapter-item"),
        Selector::parse("a[href]"),
    ) else {
        return Vec::new();
    };

    doc.select(&item_sel)
        .filter_map(|item| {
            let title = collapsed_text(&item);
            let id = item
                .select(&link_sel)
                .next()
                .and_then(|link| link.value().attr("href"))
                .and_then(last_segment);
            if id.is_none() {
                tome_warn!("Skipping chapter entry without link: {:?}", title);
            }
            Some(ChapterEntry::new(id?, title))
        })
        .collect()
}

fn last_segment(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn select_first<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel).next()
}

fn collapsed_text(node: &ElementRef<'_>) -> String {
    node.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
