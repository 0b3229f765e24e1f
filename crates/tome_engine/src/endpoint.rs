use serde::{Deserialize, Serialize};

use crate::{FailureKind, FetchError, PayloadFormat};

/// Placeholder replaced by the chapter id in endpoint templates.
pub const ID_PLACEHOLDER: &str = "{id}";

/// One interchangeable content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Stable name used for health tracking and logs.
    pub id: String,
    /// URL with `{id}` where the chapter id goes.
    pub url_template: String,
    #[serde(default)]
    pub format: PayloadFormat,
}

impl EndpointConfig {
    pub fn new(id: impl Into<String>, url_template: impl Into<String>, format: PayloadFormat) -> Self {
        Self {
            id: id.into(),
            url_template: url_template.into(),
            format,
        }
    }

    /// Substitutes the percent-encoded chapter id and validates the result.
    pub fn url_for(&self, chapter_id: &str) -> Result<String, FetchError> {
        if !self.url_template.contains(ID_PLACEHOLDER) {
            return Err(FetchError::new(
                FailureKind::InvalidUrl,
                format!("template for {} has no {ID_PLACEHOLDER}", self.id),
            ));
        }
        let encoded: String = url::form_urlencoded::byte_serialize(chapter_id.as_bytes()).collect();
        let url = self.url_template.replace(ID_PLACEHOLDER, &encoded);
        url::Url::parse(&url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        Ok(url)
    }
}

/// The reader page endpoint the tool falls back to when nothing is configured.
pub fn default_endpoints() -> Vec<EndpointConfig> {
    vec![EndpointConfig::new(
        "reader",
        "https://fanqienovel.com/reader/{id}",
        PayloadFormat::default(),
    )]
}
