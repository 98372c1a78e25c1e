use crate::config::RenditionConfig;
use crate::retry::with_retry;
use crate::traits::RenditionSource;
use crate::types::{excerpt, AssetRef, FetchedPayload, RenditionCandidate, Result, TaggerError};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Why a single rendition download attempt failed.
#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("rendition not found (404)")]
    NotFound,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("body not received within {0:?}")]
    BodyTimeout(Duration),

    #[error("rendition is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("rendition body is empty")]
    Empty,
}

impl FetchError {
    /// Not-found, oversized and empty renditions won't change on retry; move to the next candidate.
    fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::NotFound | FetchError::TooLarge { .. } | FetchError::Empty)
    }
}

pub struct RenditionResolver {
    client: Client,
    config: RenditionConfig,
    access_token: String,
}

impl RenditionResolver {
    pub fn new(config: RenditionConfig, user_agent: &str, access_token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(config.request_timeout)
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            config,
            access_token: access_token.into(),
        })
    }

    pub fn config(&self) -> &RenditionConfig {
        &self.config
    }

    pub async fn resolve(&self, asset: &AssetRef, candidates: &[RenditionCandidate]) -> Result<FetchedPayload> {
        if candidates.is_empty() {
            return Err(TaggerError::InvalidInput("rendition candidate list is empty".to_string()));
        }

        let policy = self.config.retry_policy();
        let mut tried = Vec::with_capacity(candidates.len());

        info!(
            "Starting rendition download for {} with {} fallback options",
            asset.path,
            candidates.len()
        );

        for (index, candidate) in candidates.iter().enumerate() {
            let url = format!("{}{}{}", asset.base_url, asset.path, candidate.suffix);
            let label = format!("rendition {}", candidate.suffix);
            tried.push(candidate.suffix.clone());

            info!("Trying rendition {}/{}: {}", index + 1, candidates.len(), candidate.suffix);

            let outcome = with_retry(&policy, &label, |_| self.fetch_once(&url), FetchError::is_retryable).await;

            match outcome {
                Ok(fetched) => {
                    let (bytes, content_type) = fetched.value;
                    info!(
                        "Using rendition {} ({} bytes, {} attempts)",
                        candidate.suffix,
                        bytes.len(),
                        fetched.attempts.len()
                    );
                    return Ok(FetchedPayload {
                        byte_length: bytes.len(),
                        bytes,
                        content_type,
                        candidate: candidate.clone(),
                        candidate_index: index,
                    });
                }
                Err(failure) if matches!(failure.error, FetchError::NotFound) => {
                    info!("Rendition not found: {}, trying next fallback", candidate.suffix);
                }
                Err(failure) => {
                    warn!(
                        "Giving up on rendition {} after {} attempts: {}",
                        candidate.suffix,
                        failure.attempt_count(),
                        failure.error
                    );
                }
            }
        }

        error!(
            "No suitable rendition found for {}; tried: {}",
            asset.path,
            tried.join(", ")
        );
        Err(TaggerError::NoRenditionAvailable {
            asset: asset.path.clone(),
            tried,
        })
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<(Vec<u8>, Option<String>), FetchError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .header(ACCEPT, "image/*")
            .send()
            .await?;

        let status = response.status();
        debug!("Response {} for {}", status, url);

        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: excerpt(&body, 200),
            });
        }

        let limit = self.config.max_payload_bytes;
        if let Some(size) = response.content_length() {
            if size > limit {
                return Err(FetchError::TooLarge { size, limit });
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body_timeout = self.config.body_timeout;
        let bytes = tokio::time::timeout(body_timeout, response.bytes())
            .await
            .map_err(|_| FetchError::BodyTimeout(body_timeout))??;

        if bytes.is_empty() {
            return Err(FetchError::Empty);
        }
        if bytes.len() as u64 > limit {
            return Err(FetchError::TooLarge {
                size: bytes.len() as u64,
                limit,
            });
        }

        Ok((bytes.to_vec(), content_type))
    }
}

#[async_trait]
impl RenditionSource for RenditionResolver {
    async fn resolve(&self, asset: &AssetRef, candidates: &[RenditionCandidate]) -> Result<FetchedPayload> {
        RenditionResolver::resolve(self, asset, candidates).await
    }
}
