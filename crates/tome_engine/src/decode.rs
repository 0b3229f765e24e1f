use serde::{Deserialize, Serialize};

use crate::cipher::{self, CipherMode};
use crate::extract::extract_reader_page;
use crate::markup;

/// Shape of the payload an endpoint returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadFormat {
    /// JSON envelope `{code, data: {content, title?}}` with markup content.
    Envelope {
        #[serde(default)]
        cipher: Option<CipherMode>,
    },
    /// A bare markup fragment.
    Markup {
        #[serde(default)]
        cipher: Option<CipherMode>,
    },
    /// A full reader page whose paragraphs are cipher coded.
    ReaderPage {
        #[serde(default)]
        cipher: Option<CipherMode>,
    },
}

impl Default for PayloadFormat {
    fn default() -> Self {
        PayloadFormat::ReaderPage {
            cipher: Some(CipherMode::Mode0),
        }
    }
}

impl PayloadFormat {
    fn cipher(self) -> Option<CipherMode> {
        match self {
            PayloadFormat::Envelope { cipher }
            | PayloadFormat::Markup { cipher }
            | PayloadFormat::ReaderPage { cipher } => cipher,
        }
    }
}

/// Normalized chapter content: body lines are indented, never blank.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedChapter {
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
}

impl DecodedChapter {
    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to decode bytes with {encoding}")]
    Charset { encoding: String },
    #[error("malformed envelope: {0}")]
    Envelope(String),
    #[error("envelope rejected with code {code}")]
    Rejected { code: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: Option<serde_json::Value>,
    data: Option<EnvelopeData>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Decodes one payload into a title and body lines.
///
/// An empty payload yields an empty chapter rather than an error; callers
/// treat both as "this endpoint had nothing".
pub fn decode(payload: &str, format: PayloadFormat) -> Result<DecodedChapter, DecodeError> {
    if payload.trim().is_empty() {
        return Ok(DecodedChapter::default());
    }
    let cipher = format.cipher();
    match format {
        PayloadFormat::Envelope { .. } => decode_envelope(payload, cipher),
        PayloadFormat::Markup { .. } => Ok(decode_markup(payload, None, cipher)),
        PayloadFormat::ReaderPage { .. } => Ok(decode_reader_page(payload, cipher)),
    }
}

fn decode_envelope(
    payload: &str,
    cipher: Option<CipherMode>,
) -> Result<DecodedChapter, DecodeError> {
    let envelope: Envelope =
        serde_json::from_str(payload).map_err(|err| DecodeError::Envelope(err.to_string()))?;
    match envelope.code.as_ref() {
        Some(code) if is_ok_code(code) => {}
        Some(code) => {
            return Err(DecodeError::Rejected {
                code: code.to_string(),
            })
        }
        None => {
            return Err(DecodeError::Rejected {
                code: "missing".to_string(),
            })
        }
    }
    let Some(data) = envelope.data else {
        return Ok(DecodedChapter::default());
    };
    let content = data.content.unwrap_or_default();
    let title = data
        .title
        .map(|t| decode_text(t.trim(), cipher))
        .filter(|t| !t.is_empty());
    Ok(decode_markup(&content, title, cipher))
}

fn is_ok_code(code: &serde_json::Value) -> bool {
    code.as_i64() == Some(0) || code.as_str().is_some_and(|s| s.trim() == "0")
}

fn decode_markup(html: &str, title: Option<String>, cipher: Option<CipherMode>) -> DecodedChapter {
    let text = markup::markup_to_text(html, title.as_deref(), |plain| decode_text(plain, cipher));
    DecodedChapter {
        title,
        paragraphs: into_paragraphs(&text),
    }
}

fn decode_reader_page(html: &str, cipher: Option<CipherMode>) -> DecodedChapter {
    let page = extract_reader_page(html);
    let title = page.title.map(|t| decode_text(&t, cipher));
    let body = page
        .paragraphs
        .iter()
        .map(|p| decode_text(p, cipher))
        .collect::<Vec<_>>()
        .join("\n");
    let text = markup::normalize_lines(markup::strip_title_prefix(&body, title.as_deref()));
    DecodedChapter {
        title,
        paragraphs: into_paragraphs(&text),
    }
}

fn decode_text(text: &str, cipher: Option<CipherMode>) -> String {
    match cipher {
        Some(mode) => cipher::decode_str(text, mode),
        None => text.to_string(),
    }
}

fn into_paragraphs(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}
