use crate::retry::{BackoffSchedule, RetryPolicy};
use crate::types::{RenditionCandidate, Result, TaggerError};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "AITaggingWorker/1.0";

/// Rendition suffixes tried when the caller does not supply its own list, best quality first.
pub const DEFAULT_RENDITIONS: [&str; 4] = [
    "/jcr:content/renditions/cq5dam.web.1280.1280.jpeg",
    "/jcr:content/renditions/cq5dam.thumbnail.319.319.png",
    "/jcr:content/renditions/cq5dam.thumbnail.140.100.png",
    "/jcr:content/renditions/cq5dam.thumbnail.48.48.png",
];

#[derive(Debug, Clone)]
pub struct RenditionConfig {
    pub request_timeout: Duration,
    /// Bound on reading the body once headers are in; kept below `request_timeout`.
    pub body_timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_payload_bytes: u64,
    pub candidates: Vec<RenditionCandidate>,
}

impl RenditionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            pre_attempt_delay: Duration::ZERO,
            schedule: BackoffSchedule::Linear { step: self.base_delay },
        }
    }
}

impl Default for RenditionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            body_timeout: Duration::from_secs(25),
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_payload_bytes: 50 * 1024 * 1024,
            candidates: DEFAULT_RENDITIONS.iter().map(|s| RenditionCandidate::new(*s)).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl InferenceConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            pre_attempt_delay: Duration::ZERO,
            schedule: BackoffSchedule::Linear { step: self.base_delay },
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            temperature: 0.1,
            max_tokens: 900,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommitConfig {
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub pre_attempt_delay: Duration,
    pub retry_delay: Duration,
    /// Chain the content-node writer after the Assets API writer gives up.
    pub fallback_on_primary_failure: bool,
}

impl CommitConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            pre_attempt_delay: self.pre_attempt_delay,
            schedule: BackoffSchedule::Constant { interval: self.retry_delay },
        }
    }
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            pre_attempt_delay: Duration::from_secs(1),
            retry_delay: Duration::from_secs(2),
            fallback_on_primary_failure: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaggerConfig {
    pub user_agent: String,
    pub staging_dir: PathBuf,
    pub rendition: RenditionConfig,
    pub inference: InferenceConfig,
    pub commit: CommitConfig,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            staging_dir: env::temp_dir(),
            rendition: RenditionConfig::default(),
            inference: InferenceConfig::default(),
            commit: CommitConfig::default(),
        }
    }
}

impl TaggerConfig {
    /// Defaults overridden by `TAGGER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("TAGGER_STAGING_DIR") {
            config.staging_dir = PathBuf::from(dir);
        }
        if let Some(agent) = lookup("TAGGER_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "TAGGER_RENDITION_TIMEOUT_SECS")? {
            config.rendition.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "TAGGER_BODY_TIMEOUT_SECS")? {
            config.rendition.body_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "TAGGER_INFERENCE_TIMEOUT_SECS")? {
            config.inference.request_timeout = Duration::from_secs(secs);
        }
        if let Some(fallback) = parse_var::<bool>(&lookup, "TAGGER_COMMIT_FALLBACK")? {
            config.commit.fallback_on_primary_failure = fallback;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rendition.body_timeout >= self.rendition.request_timeout {
            return Err(TaggerError::InvalidInput(format!(
                "body timeout ({:?}) must be shorter than the rendition request timeout ({:?})",
                self.rendition.body_timeout, self.rendition.request_timeout
            )));
        }
        if self.rendition.max_attempts == 0 || self.inference.max_attempts == 0 || self.commit.max_attempts == 0 {
            return Err(TaggerError::InvalidInput("retry budgets must allow at least one attempt".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| TaggerError::InvalidInput(format!("{} has an invalid value: {}", key, raw))),
    }
}
