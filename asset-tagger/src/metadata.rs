use crate::config::CommitConfig;
use crate::retry::{with_retry, AttemptRecord, RetryPolicy};
use crate::traits::MetadataWriter;
use crate::types::{excerpt, AssetRef, CommitAttempt, CommitOutcome, CommitReport, PropertySet, Result, TaggerError, WritePath};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Prefix that routes Assets API properties into the metadata node instead of `jcr:content`.
pub const METADATA_PREFIX: &str = "metadata/";
pub const DAM_ROOT: &str = "/content/dam";
pub const METADATA_NODE_SUFFIX: &str = "/jcr:content/metadata";

/// Failure of a single metadata write attempt.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("repository reported status {}: {message}", code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    Rejected { code: Option<i64>, message: String },

    #[error("response body is not JSON: {0}")]
    UnparsableBody(String),

    #[error("response carried no status")]
    MissingStatus,
}

/// Writes through the Assets HTTP API. Success is the `status.code` embedded in the body.
pub struct AssetsApiWriter {
    client: Client,
    access_token: String,
}

impl AssetsApiWriter {
    pub fn new(client: Client, access_token: impl Into<String>) -> Self {
        Self {
            client,
            access_token: access_token.into(),
        }
    }

    pub fn endpoint(asset: &AssetRef) -> String {
        let api_path = asset.path.strip_prefix(DAM_ROOT).unwrap_or(&asset.path);
        format!("{}/api/assets{}", asset.base_url, api_path)
    }

    /// Builds the request body without touching `properties`.
    pub fn payload(properties: &PropertySet) -> Value {
        let prefixed: Map<String, Value> = properties
            .iter()
            .map(|(key, value)| (format!("{}{}", METADATA_PREFIX, key), value.clone()))
            .collect();
        json!({
            "class": "asset",
            "properties": prefixed,
        })
    }
}

#[async_trait]
impl MetadataWriter for AssetsApiWriter {
    fn path(&self) -> WritePath {
        WritePath::AssetsApi
    }

    async fn write(&self, asset: &AssetRef, properties: &PropertySet) -> std::result::Result<(), WriteError> {
        let url = Self::endpoint(asset);
        debug!("Assets HTTP API update URL: {}", url);

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.access_token)
            .header(ACCEPT, "application/json")
            .header(CACHE_CONTROL, "no-cache")
            .json(&Self::payload(properties))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!("Assets HTTP API response: {} ({} chars)", status, text.len());

        let body: Option<Value> = if text.trim().is_empty() {
            None
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => Some(value),
                Err(_) if !status.is_success() => None,
                Err(e) => return Err(WriteError::UnparsableBody(format!("{}: {}", e, excerpt(&text, 200)))),
            }
        };

        let embedded = body.as_ref().and_then(|b| b.get("properties"));
        let code = embedded.and_then(|p| p.get("status.code")).and_then(Value::as_i64);
        let message = embedded
            .and_then(|p| p.get("status.message"))
            .and_then(Value::as_str)
            .map(|s| s.to_string());

        if !status.is_success() {
            return match code {
                Some(code) => Err(WriteError::Rejected {
                    code: Some(code),
                    message: message.unwrap_or_default(),
                }),
                None => Err(WriteError::Status {
                    status: status.as_u16(),
                    body: excerpt(&text, 200),
                }),
            };
        }

        match (body.is_some(), code) {
            (_, Some(200)) => Ok(()),
            (false, _) => Err(WriteError::MissingStatus),
            (true, code) => Err(WriteError::Rejected {
                code,
                message: message.unwrap_or_else(|| "unknown".to_string()),
            }),
        }
    }
}

/// Writes straight to the asset's metadata node with a form post. Success is any 2xx.
pub struct ContentNodeWriter {
    client: Client,
    access_token: String,
}

impl ContentNodeWriter {
    pub fn new(client: Client, access_token: impl Into<String>) -> Self {
        Self {
            client,
            access_token: access_token.into(),
        }
    }

    pub fn endpoint(asset: &AssetRef) -> String {
        format!("{}{}{}", asset.base_url, asset.path, METADATA_NODE_SUFFIX)
    }

    /// One pair per property, array values repeated once per entry.
    pub fn form_pairs(properties: &PropertySet) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(properties.len());
        for (key, value) in properties {
            match value {
                Value::Array(items) => {
                    for item in items {
                        pairs.push((key.clone(), form_value(item)));
                    }
                }
                other => pairs.push((key.clone(), form_value(other))),
            }
        }
        pairs
    }
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl MetadataWriter for ContentNodeWriter {
    fn path(&self) -> WritePath {
        WritePath::ContentNode
    }

    async fn write(&self, asset: &AssetRef, properties: &PropertySet) -> std::result::Result<(), WriteError> {
        let url = Self::endpoint(asset);
        debug!("Updating metadata directly at node: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .form(&Self::form_pairs(properties))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(WriteError::Status {
            status: status.as_u16(),
            body: excerpt(&body, 200),
        })
    }
}

/// Drives one [`MetadataWriter`] to terminal success within a fixed attempt budget.
#[derive(Clone)]
pub struct MetadataCommitter {
    writer: Arc<dyn MetadataWriter>,
    policy: RetryPolicy,
}

impl MetadataCommitter {
    pub fn new(writer: Arc<dyn MetadataWriter>, policy: RetryPolicy) -> Self {
        Self { writer, policy }
    }

    pub fn from_config(writer: Arc<dyn MetadataWriter>, config: &CommitConfig) -> Self {
        Self::new(writer, config.retry_policy())
    }

    pub fn path(&self) -> WritePath {
        self.writer.path()
    }

    pub async fn commit(&self, asset: &AssetRef, properties: &PropertySet) -> Result<CommitReport> {
        let path = self.writer.path();
        let label = format!("metadata commit ({})", path);
        info!("Starting {} metadata update for {} ({} properties)", path, asset.path, properties.len());

        let mut log: Vec<CommitAttempt> = Vec::new();
        let outcome = with_retry(
            &self.policy,
            &label,
            |attempt| {
                log.push(CommitAttempt::pending(attempt, path));
                self.writer.write(asset, properties)
            },
            |_: &WriteError| true,
        )
        .await;

        match outcome {
            Ok(done) => {
                info!("Metadata updated via {} for {}", path, asset.file_name());
                Ok(CommitReport {
                    path,
                    attempts: resolve_log(log, &done.attempts, true),
                })
            }
            Err(failure) => {
                let attempts = failure.attempt_count();
                error!(
                    "Failed to update metadata via {} after {} attempts: {}",
                    path, attempts, failure.error
                );
                let attempt_log = resolve_log(log, &failure.attempts, false);
                for attempt in &attempt_log {
                    warn!("{:?}", attempt);
                }
                Err(TaggerError::MetadataCommitFailed {
                    asset: asset.path.clone(),
                    path,
                    attempts,
                    last_error: failure.error.to_string(),
                    attempt_log,
                })
            }
        }
    }
}

/// Settles the attempts issued as pending against what the retry loop observed.
fn resolve_log(issued: Vec<CommitAttempt>, records: &[AttemptRecord], succeeded: bool) -> Vec<CommitAttempt> {
    let last = records.len();
    issued
        .into_iter()
        .zip(records)
        .enumerate()
        .map(|(i, (pending, record))| {
            let outcome = match (&record.error, i + 1 == last, succeeded) {
                (None, _, _) => CommitOutcome::TerminalSuccess,
                (Some(_), true, false) => CommitOutcome::TerminalFailure,
                (Some(_), _, _) => CommitOutcome::TransientFailure,
            };
            pending.resolve(outcome, record.error.clone())
        })
        .collect()
}
