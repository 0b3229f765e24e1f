//! Rendering of the output document and recovery of chapter blocks from a
//! previously written one.
//!
//! Document layout:
//!
//! ```text
//! Title: {title}
//! Author: {author}
//! Description: {first line}
//! {further description lines}
//!
//! {chapter heading}
//!
//!     {paragraph}
//!     {paragraph}
//!
//! ```
//!
//! Header lines and headings never contain blank lines, paragraphs are
//! non-blank lines; this is what makes [`parse_document`] unambiguous.

use std::collections::BTreeMap;

use crate::{Chapter, FetchResult, ProgressSet, Work};

/// Content of one chapter as it appears in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterText {
    pub heading: String,
    pub paragraphs: Vec<String>,
}

impl ChapterText {
    pub fn from_result(chapter: &Chapter, result: &FetchResult) -> Self {
        Self {
            heading: chapter_heading(chapter, result.remote_title.as_deref()),
            paragraphs: result.paragraphs.clone(),
        }
    }
}

/// Heading line for a chapter: its display title, else the title the
/// endpoint reported, else `Chapter {n}`.
pub fn chapter_heading(chapter: &Chapter, remote_title: Option<&str>) -> String {
    [Some(chapter.display_title.as_str()), remote_title]
        .into_iter()
        .flatten()
        .map(single_line)
        .find(|title| !title.is_empty())
        .unwrap_or_else(|| format!("Chapter {}", chapter.index + 1))
}

/// Renders the whole document: header, then every chapter present in
/// `chapters` in ascending index order. Missing chapters are omitted.
pub fn render(work: &Work, chapters: &BTreeMap<usize, ChapterText>) -> String {
    let mut buffer = render_header(work);
    for chapter in work.chapters() {
        let Some(text) = chapters.get(&chapter.index) else {
            continue;
        };
        buffer.push_str(&single_line(&text.heading));
        buffer.push_str("\n\n");
        for line in text
            .paragraphs
            .iter()
            .flat_map(|paragraph| paragraph.lines())
            .filter(|line| !line.trim().is_empty())
        {
            buffer.push_str(line.trim_end());
            buffer.push('\n');
        }
        buffer.push('\n');
    }
    buffer
}

fn render_header(work: &Work) -> String {
    let mut description = work
        .description
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty());
    let mut header = format!(
        "Title: {}\nAuthor: {}\nDescription: {}\n",
        single_line(&work.title),
        single_line(&work.author),
        description.next().unwrap_or_default()
    );
    for line in description {
        header.push_str(line);
        header.push('\n');
    }
    header.push('\n');
    header
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Chapter blocks recovered from an existing document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecoveredDocument {
    pub chapters: BTreeMap<usize, ChapterText>,
    /// Blocks whose heading matched no remaining chapter.
    pub unmatched_blocks: usize,
}

/// Parses a document produced by [`render`] back into chapter blocks.
///
/// Blocks are matched to chapters in index order, never moving backwards.
/// For each block the first candidate from the cursor is taken, trying in turn:
///
/// 1. a chapter in `recorded` whose display title equals the heading;
/// 2. an untitled chapter in `recorded`, whose heading came from a fallback;
/// 3. a chapter outside `recorded` whose display title equals the heading,
///    for documents written just before the set was saved.
///
/// Restricting the first two tiers to recorded chapters keeps blocks of
/// chapters sharing a title with their real owner. The header is skipped,
/// whatever its content.
pub fn parse_document(work: &Work, text: &str, recorded: &ProgressSet) -> RecoveredDocument {
    let mut recovered = RecoveredDocument::default();
    let mut cursor = 0;
    let chapters = work.chapters();

    for (heading, paragraphs) in split_blocks(text) {
        let remaining = &chapters[cursor..];
        let titled = |chapter: &Chapter| {
            let title = single_line(&chapter.display_title);
            !title.is_empty() && title == heading
        };
        let found = remaining
            .iter()
            .position(|c| recorded.contains(&c.id) && titled(c))
            .or_else(|| {
                remaining.iter().position(|c| {
                    recorded.contains(&c.id) && single_line(&c.display_title).is_empty()
                })
            })
            .or_else(|| remaining.iter().position(|c| titled(c)));
        match found {
            Some(offset) => {
                let chapter = &remaining[offset];
                recovered.chapters.insert(
                    chapter.index,
                    ChapterText {
                        heading,
                        paragraphs,
                    },
                );
                cursor += offset + 1;
            }
            None => recovered.unmatched_blocks += 1,
        }
    }
    recovered
}

fn split_blocks(text: &str) -> Vec<(String, Vec<String>)> {
    let mut lines = text.lines().peekable();

    // Header runs up to the first blank line.
    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
    }

    let mut blocks = Vec::new();
    loop {
        while lines.peek().is_some_and(|line| line.trim().is_empty()) {
            lines.next();
        }
        let Some(heading) = lines.next() else {
            break;
        };
        match lines.next() {
            Some(line) if line.trim().is_empty() => {}
            // A heading must be followed by a blank line; anything else is
            // not a block this crate wrote.
            _ => break,
        }
        let mut paragraphs = Vec::new();
        while let Some(line) = lines.next_if(|line| !line.trim().is_empty()) {
            paragraphs.push(line.to_string());
        }
        blocks.push((heading.trim().to_string(), paragraphs));
    }
    blocks
}
