//! Content gate for media-only channels
//!
//! A message passes when one of its attachments or linked URLs answers a HEAD
//! request with an `image/*` content type.

use crate::gateway::IncomingMessage;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://([a-zA-Z0-9\-_~]+\.)+[a-zA-Z0-9\-_~]+(/\S*)?")
        .expect("URL pattern is a valid regex")
});

/// Reasons a URL could not be classified
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response has no content type")]
    MissingContentType,

    #[error("content type is not valid text: {0}")]
    InvalidHeader(String),
}

/// What the gate does after a probe fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailurePolicy {
    /// Stop scanning and treat the message as having no media
    #[default]
    Abort,
    /// Treat the URL as not an image and try the next one
    Skip,
}

/// Looks up the content type behind a URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn content_type(&self, url: &str) -> Result<String, ProbeError>;
}

/// Probe that sends an HTTP HEAD request
#[derive(Debug, Clone)]
pub struct HttpMediaProbe {
    client: reqwest::Client,
}

impl HttpMediaProbe {
    /// Build a probe whose requests give up after `timeout`
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaProbe for HttpMediaProbe {
    async fn content_type(&self, url: &str) -> Result<String, ProbeError> {
        let response = self.client.head(url).send().await?;
        let header = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .ok_or(ProbeError::MissingContentType)?;

        header
            .to_str()
            .map(ToString::to_string)
            .map_err(|e| ProbeError::InvalidHeader(e.to_string()))
    }
}

/// URLs to check for a message: attachments first, then links in the text
#[must_use]
pub fn candidate_urls(message: &IncomingMessage) -> Vec<String> {
    message
        .attachment_urls
        .iter()
        .cloned()
        .chain(
            URL_PATTERN
                .find_iter(&message.content)
                .map(|m| m.as_str().to_string()),
        )
        .collect()
}

/// Stateless per-message media check
#[derive(Clone)]
pub struct ContentGate {
    probe: Arc<dyn MediaProbe>,
    policy: ProbeFailurePolicy,
}

impl ContentGate {
    #[must_use]
    pub fn new(probe: Arc<dyn MediaProbe>, policy: ProbeFailurePolicy) -> Self {
        Self { probe, policy }
    }

    /// Whether the message carries at least one image
    pub async fn contains_media(&self, message: &IncomingMessage) -> bool {
        for url in candidate_urls(message) {
            match self.probe.content_type(&url).await {
                Ok(mime) if mime.starts_with("image/") => return true,
                Ok(mime) => {
                    debug!(message_id = message.id, %url, %mime, "Linked content is not an image");
                }
                Err(e) => {
                    debug!(message_id = message.id, %url, error = %e, "Media probe failed");
                    if self.policy == ProbeFailurePolicy::Abort {
                        break;
                    }
                }
            }
        }

        false
    }
}
