use scraper::{Html, Selector};

/// Text pulled out of a reader page, before any cipher decode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReaderPageText {
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
}

/// Lightweight reader-page extractor:
/// - title from `h1.muye-reader-title`, else the first `h1`
/// - paragraphs from `<p>` elements inside `div.muye-reader-content`
/// - otherwise every `<p>` of the document.
pub fn extract_reader_page(html: &str) -> ReaderPageText {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, "h1.muye-reader-title").or_else(|| first_text(&doc, "h1"));

    let mut paragraphs = all_texts(&doc, "div.muye-reader-content p");
    if paragraphs.is_empty() {
        paragraphs = all_texts(&doc, "p");
    }

    ReaderPageText { title, paragraphs }
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .next()
        .map(|node| node.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

fn all_texts(doc: &Html, selector: &str) -> Vec<String> {
    let Ok(sel) = Selector::parse(selector) else {
        return Vec::new();
    };
    doc.select(&sel)
        .map(|node| node.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect()
}
