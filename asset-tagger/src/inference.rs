use crate::config::InferenceConfig;
use crate::retry::with_retry;
use crate::traits::VisionModel;
use crate::types::{excerpt, EncodedImage, InferenceAnswer, PromptSpec, Result, TaggerError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Endpoint and key of the vision deployment. Both are opaque to the pipeline.
#[derive(Debug, Clone)]
pub struct InferenceEndpoint {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Failure of one inference attempt.
#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub struct InferenceClient {
    client: Client,
    endpoint: InferenceEndpoint,
    config: InferenceConfig,
}

impl InferenceClient {
    pub fn new(endpoint: InferenceEndpoint, config: InferenceConfig, user_agent: &str) -> Result<Self> {
        if endpoint.url.trim().is_empty() || endpoint.api_key.trim().is_empty() {
            return Err(TaggerError::InvalidInput("inference endpoint and api key are required".to_string()));
        }
        url::Url::parse(&endpoint.url)?;

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, endpoint, config })
    }

    pub async fn infer(&self, prompt: &PromptSpec, image: &EncodedImage) -> Result<InferenceAnswer> {
        let request = ChatRequest {
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: &prompt.prompt_text,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image.data_url() },
                    },
                ],
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let policy = self.config.retry_policy();
        let outcome = with_retry(&policy, "inference", |_| self.send_once(&request), |_: &AttemptError| true).await;

        match outcome {
            Ok(answered) => {
                if answered.attempts.len() > 1 {
                    info!(
                        "Retrieved inference answer after {} retries",
                        answered.attempts.len() - 1
                    );
                }
                if answered.value.is_none() {
                    warn!("Inference returned no answer content");
                }
                Ok(InferenceAnswer {
                    content: answered.value,
                    attempts: answered.attempts.len() as u32,
                })
            }
            Err(failure) => {
                let attempts = failure.attempt_count();
                error!("Inference failed after {} attempts: {}", attempts, failure.error);
                let (status, body) = match failure.error {
                    AttemptError::Status { status, body } => (Some(status), body),
                    AttemptError::Transport(e) => (e.status().map(|s| s.as_u16()), e.to_string()),
                };
                Err(TaggerError::InferenceRequestFailed { status, body, attempts })
            }
        }
    }

    async fn send_once(&self, request: &ChatRequest<'_>) -> std::result::Result<Option<String>, AttemptError> {
        let response = self
            .client
            .post(&self.endpoint.url)
            .header("api-key", &self.endpoint.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Status {
                status: status.as_u16(),
                body: excerpt(&body, 500),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        debug!("Inference returned {} choices", parsed.choices.len());

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content))
    }
}

#[async_trait]
impl VisionModel for InferenceClient {
    fn model_name(&self) -> String {
        self.endpoint.url.clone()
    }

    async fn infer(&self, prompt: &PromptSpec, image: &EncodedImage) -> Result<InferenceAnswer> {
        InferenceClient::infer(self, prompt, image).await
    }
}
