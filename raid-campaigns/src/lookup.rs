use async_trait::async_trait;
use serde::Deserialize;

use crate::model::ContentItem;

/// Fetches tweets by id. Implementations must accept at least 99 ids per call.
#[async_trait]
pub trait ContentLookupClient: Send + Sync {
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<ContentItem>, LookupError>;
}

/// One entry of the `errors` array of an X API response.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    /// The id the error is about, if it's about a single id
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.title.as_deref().unwrap_or("Unknown error"),
            self.detail.as_deref().unwrap_or("{details are unknown}")
        )?;
        if let Some(id) = self.resource_id.as_ref().or(self.value.as_ref()) {
            write!(f, " (id {id})")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Content lookup request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Content API responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Content API reported {} error(s): {}", errors.len(), display_errors(errors))]
    Api { errors: Vec<ApiError> },

    #[error("Unexpected content API response: {0}")]
    Decode(#[from] serde_json::Error),
}

fn display_errors(errors: &[ApiError]) -> String {
    errors
        .iter()
        .map(|error| error.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl LookupError {
    /// Per-id errors reported by the API, empty for transport failures.
    pub fn api_errors(&self) -> &[ApiError] {
        match self {
            LookupError::Api { errors } => errors,
            _ => &[],
        }
    }
}
