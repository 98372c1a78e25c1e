use crate::config::TaggerConfig;
use crate::inference::{InferenceClient, InferenceEndpoint};
use crate::metadata::{AssetsApiWriter, ContentNodeWriter, MetadataCommitter};
use crate::normalizer::normalize;
use crate::prompt::PromptBuilder;
use crate::resolver::RenditionResolver;
use crate::staging::{StagedPayload, TempDirStager};
use crate::timeline::{Stage, Timeline};
use crate::traits::{PayloadStager, RenditionSource, VisionModel};
use crate::types::{
    AssetRef, CommitAttempt, ConfigMap, PropertySet, RenditionCandidate, Result, TaggerError,
    STATUS_PROCESSED, STATUS_PROPERTY,
};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Invocation parameters as delivered by the trigger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggingRequest {
    #[serde(default)]
    pub asset_path: String,
    /// Required; an empty object is accepted and yields a prompt without keys.
    #[serde(default)]
    pub prompt_configs: Option<ConfigMap>,
    #[serde(default)]
    pub aem_instance_url: String,
    /// Overrides the configured rendition fallback chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renditions: Option<Vec<String>>,
}

impl TaggingRequest {
    pub fn validate(&self) -> Result<AssetRef> {
        let mut missing = Vec::new();
        if self.asset_path.trim().is_empty() {
            missing.push("assetPath");
        }
        if self.prompt_configs.is_none() {
            missing.push("promptConfigs");
        }
        if self.aem_instance_url.trim().is_empty() {
            missing.push("aemInstanceUrl");
        }
        if !missing.is_empty() {
            return Err(TaggerError::InvalidInput(format!("missing {}", missing.join(", "))));
        }

        if !self.asset_path.starts_with('/') {
            return Err(TaggerError::InvalidInput(format!(
                "assetPath must be absolute: {}",
                self.asset_path
            )));
        }

        let base = url::Url::parse(&self.aem_instance_url)?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(TaggerError::InvalidInput(format!(
                "aemInstanceUrl must be http(s): {}",
                self.aem_instance_url
            )));
        }

        if matches!(&self.renditions, Some(list) if list.is_empty()) {
            return Err(TaggerError::InvalidInput("renditions must not be empty when given".to_string()));
        }

        Ok(AssetRef::new(self.asset_path.trim(), self.aem_instance_url.trim()))
    }

    pub fn configs(&self) -> Result<&ConfigMap> {
        self.prompt_configs
            .as_ref()
            .ok_or_else(|| TaggerError::InvalidInput("missing promptConfigs".to_string()))
    }
}

/// Linear progress of one run; there are no back-edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Start,
    PromptBuilt,
    RenditionFetched,
    Inferred,
    Normalized,
    CommitAttempted,
    SkippedNoProperties,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// What the trigger adapter gets back from one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggingReport {
    pub status: RunStatus,
    pub asset_path: String,
    pub updated_properties: Vec<String>,
    pub properties_count: usize,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendition: Option<String>,
    pub commit_attempts: Vec<CommitAttempt>,
    pub final_state: PipelineState,
    pub timeline: Timeline,
}

impl TaggingReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// A failed run: the error that stopped it and everything recorded up to that point.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct PipelineFailure {
    pub error: TaggerError,
    pub report: TaggingReport,
}

/// Credentials the pipeline consumes as opaque, already-resolved values.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub inference: InferenceEndpoint,
}

/// Everything that belongs to one invocation and nothing else.
struct PipelineRun {
    asset_path: String,
    state: PipelineState,
    timeline: Timeline,
    staged: Option<StagedPayload>,
    rendition: Option<String>,
    properties: PropertySet,
    commit_attempts: Vec<CommitAttempt>,
    committed: bool,
}

impl PipelineRun {
    fn new(asset_path: &str) -> Self {
        Self {
            asset_path: asset_path.to_string(),
            state: PipelineState::Start,
            timeline: Timeline::new(),
            staged: None,
            rendition: None,
            properties: PropertySet::new(),
            commit_attempts: Vec::new(),
            committed: false,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug!("{}: {:?} -> {:?}", self.asset_path, self.state, next);
        self.state = next;
    }

    /// Records the outcome of a stage and passes the result through.
    fn track<T>(&mut self, stage: Stage, started: Instant, result: Result<T>, describe: impl FnOnce(&T) -> String) -> Result<T> {
        match &result {
            Ok(value) => self.timeline.succeeded(stage, describe(value), started.elapsed()),
            Err(e) => self.timeline.failed(stage, e.to_string(), started.elapsed()),
        }
        result
    }

    fn record_failed_attempts(&mut self, error: &TaggerError) {
        if let TaggerError::MetadataCommitFailed { attempt_log, .. } = error {
            self.commit_attempts.extend(attempt_log.iter().cloned());
        }
    }

    fn into_report(self, error: Option<&TaggerError>, elapsed: Duration) -> TaggingReport {
        let updated_properties: Vec<String> = if self.committed {
            self.properties.keys().cloned().collect()
        } else {
            Vec::new()
        };

        TaggingReport {
            status: if error.is_none() { RunStatus::Success } else { RunStatus::Error },
            asset_path: self.asset_path,
            properties_count: updated_properties.len(),
            updated_properties,
            processing_time_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
            error: error.map(|e| e.to_string()),
            error_kind: error.map(|e| e.kind().to_string()),
            rendition: self.rendition,
            commit_attempts: self.commit_attempts,
            final_state: self.state,
            timeline: self.timeline,
        }
    }
}

/// Runs prompt building, rendition fetch, inference, normalisation and metadata commit for one asset.
pub struct TaggingPipeline {
    renditions: Arc<dyn RenditionSource>,
    model: Arc<dyn VisionModel>,
    stager: Arc<dyn PayloadStager>,
    primary: MetadataCommitter,
    fallback: Option<MetadataCommitter>,
    prompt_builder: PromptBuilder,
    default_candidates: Vec<RenditionCandidate>,
}

impl TaggingPipeline {
    /// Wires the HTTP-backed collaborators from configuration.
    pub fn from_config(config: &TaggerConfig, credentials: Credentials) -> Result<Self> {
        config.validate()?;

        let resolver = RenditionResolver::new(
            config.rendition.clone(),
            &config.user_agent,
            credentials.access_token.clone(),
        )?;
        let model = InferenceClient::new(credentials.inference, config.inference.clone(), &config.user_agent)?;

        let commit_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.commit.request_timeout)
            .build()?;
        let primary = MetadataCommitter::from_config(
            Arc::new(AssetsApiWriter::new(commit_client.clone(), credentials.access_token.clone())),
            &config.commit,
        );

        let mut builder = PipelineBuilder::new()
            .rendition_source(Arc::new(resolver))
            .vision_model(Arc::new(model))
            .stager(Arc::new(TempDirStager::new(config.staging_dir.clone())))
            .primary_committer(primary)
            .default_candidates(config.rendition.candidates.clone());

        if config.commit.fallback_on_primary_failure {
            builder = builder.fallback_committer(MetadataCommitter::from_config(
                Arc::new(ContentNodeWriter::new(commit_client, credentials.access_token)),
                &config.commit,
            ));
        }

        builder.build()
    }

    /// Runs and folds the outcome into a report, success or not.
    pub async fn run(&self, request: &TaggingRequest) -> TaggingReport {
        match self.execute(request).await {
            Ok(report) => report,
            Err(failure) => failure.report,
        }
    }

    pub async fn execute(&self, request: &TaggingRequest) -> std::result::Result<TaggingReport, PipelineFailure> {
        let started = Instant::now();
        let mut run = PipelineRun::new(&request.asset_path);

        info!("=== Asset tagging started: {} ===", request.asset_path);

        let outcome = self.drive(request, &mut run).await;
        self.cleanup(&mut run).await;

        let elapsed = started.elapsed();
        match outcome {
            Ok(()) => {
                info!(
                    "Asset tagging processed in {} ms for {}",
                    elapsed.as_millis(),
                    request.asset_path
                );
                Ok(run.into_report(None, elapsed))
            }
            Err(error) => {
                error!("Asset tagging failed for {}: {}", request.asset_path, error);
                let report = run.into_report(Some(&error), elapsed);
                Err(PipelineFailure { error, report })
            }
        }
    }

    async fn drive(&self, request: &TaggingRequest, run: &mut PipelineRun) -> Result<()> {
        let started = Instant::now();
        let asset = run.track(Stage::Validate, started, request.validate(), |a| {
            format!("asset {} on {}", a.path, a.base_url)
        })?;

        let started = Instant::now();
        let prompt = run.track(
            Stage::BuildPrompt,
            started,
            request
                .configs()
                .and_then(|configs| self.prompt_builder.build(configs, &asset.path)),
            |p| format!("prompt length {} characters", p.prompt_text.len()),
        )?;
        run.advance(PipelineState::PromptBuilt);

        let candidates: Vec<RenditionCandidate> = match &request.renditions {
            Some(list) => list.iter().map(|s| RenditionCandidate::new(s.as_str())).collect(),
            None => self.default_candidates.clone(),
        };

        let started = Instant::now();
        let payload = run.track(
            Stage::FetchRendition,
            started,
            self.renditions.resolve(&asset, &candidates).await,
            |p| format!("{} ({} bytes)", p.candidate.suffix, p.byte_length),
        )?;
        run.rendition = Some(payload.candidate.suffix.clone());
        run.advance(PipelineState::RenditionFetched);

        let started = Instant::now();
        let staged = run.track(
            Stage::StagePayload,
            started,
            self.stager.stage(&asset, &payload).await,
            |s| format!("staged at {}", s.path.display()),
        )?;
        run.staged = Some(staged.clone());
        drop(payload);

        let started = Instant::now();
        let image = run.track(
            Stage::Encode,
            started,
            self.stager.encode(&staged).await,
            |i| format!("{} base64 characters ({})", i.base64.len(), i.media_type),
        )?;

        debug!("Requesting tags from {}", self.model.model_name());
        let started = Instant::now();
        let answer = run.track(
            Stage::Infer,
            started,
            self.model.infer(&prompt, &image).await,
            |a| match &a.content {
                Some(content) => format!("answer of {} characters after {} attempts", content.len(), a.attempts),
                None => format!("no answer content after {} attempts", a.attempts),
            },
        )?;
        drop(image);
        run.advance(PipelineState::Inferred);

        let started = Instant::now();
        let mut properties = run.track(
            Stage::Normalize,
            started,
            normalize(answer.content.as_deref()),
            |p| format!("{} properties", p.len()),
        )?;
        run.advance(PipelineState::Normalized);

        if properties.is_empty() {
            info!("No properties to update for {}", asset.path);
            run.timeline.skipped(Stage::Commit, "no properties to update");
            run.advance(PipelineState::SkippedNoProperties);
            run.advance(PipelineState::Done);
            return Ok(());
        }

        properties.insert(STATUS_PROPERTY.to_string(), Value::String(STATUS_PROCESSED.to_string()));
        run.properties = properties;

        let result = self.commit(&asset, run).await;
        run.advance(PipelineState::CommitAttempted);
        result?;
        run.committed = true;
        run.advance(PipelineState::Done);
        Ok(())
    }

    /// Primary write, then the fallback writer when one is configured. Every
    /// attempt of either path lands in the run's attempt list.
    async fn commit(&self, asset: &AssetRef, run: &mut PipelineRun) -> Result<()> {
        let started = Instant::now();
        let primary_error = match self.primary.commit(asset, &run.properties).await {
            Ok(report) => {
                run.timeline.succeeded(
                    Stage::Commit,
                    format!("{} after {} attempts", report.path, report.attempts.len()),
                    started.elapsed(),
                );
                run.commit_attempts.extend(report.attempts);
                return Ok(());
            }
            Err(e) => {
                run.timeline.failed(Stage::Commit, e.to_string(), started.elapsed());
                run.record_failed_attempts(&e);
                e
            }
        };

        let Some(fallback) = &self.fallback else {
            return Err(primary_error);
        };

        warn!(
            "{} failed for {}, falling back to {}",
            self.primary.path(),
            asset.path,
            fallback.path()
        );
        let started = Instant::now();
        let result = fallback.commit(asset, &run.properties).await;
        if let Err(e) = &result {
            run.record_failed_attempts(e);
        }
        let report = run.track(Stage::CommitFallback, started, result, |r| {
            format!("{} after {} attempts", r.path, r.attempts.len())
        })?;
        run.commit_attempts.extend(report.attempts);
        Ok(())
    }

    /// Runs once per run; failures are logged and recorded, never raised.
    async fn cleanup(&self, run: &mut PipelineRun) {
        let Some(staged) = run.staged.take() else {
            run.timeline.skipped(Stage::Cleanup, "nothing staged");
            return;
        };

        let started = Instant::now();
        match self.stager.cleanup(&staged).await {
            Ok(()) => run
                .timeline
                .succeeded(Stage::Cleanup, format!("removed {}", staged.path.display()), started.elapsed()),
            Err(e) => {
                warn!("Failed to delete staged file {}: {}", staged.path.display(), e);
                run.timeline.failed(Stage::Cleanup, e.to_string(), started.elapsed());
            }
        }
    }
}

/// Pipeline builder for wiring custom collaborators.
#[derive(Default)]
pub struct PipelineBuilder {
    renditions: Option<Arc<dyn RenditionSource>>,
    model: Option<Arc<dyn VisionModel>>,
    stager: Option<Arc<dyn PayloadStager>>,
    primary: Option<MetadataCommitter>,
    fallback: Option<MetadataCommitter>,
    default_candidates: Option<Vec<RenditionCandidate>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendition_source(mut self, source: Arc<dyn RenditionSource>) -> Self {
        self.renditions = Some(source);
        self
    }

    pub fn vision_model(mut self, model: Arc<dyn VisionModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn stager(mut self, stager: Arc<dyn PayloadStager>) -> Self {
        self.stager = Some(stager);
        self
    }

    pub fn primary_committer(mut self, committer: MetadataCommitter) -> Self {
        self.primary = Some(committer);
        self
    }

    /// Tried only after the primary committer has given up.
    pub fn fallback_committer(mut self, committer: MetadataCommitter) -> Self {
        self.fallback = Some(committer);
        self
    }

    pub fn default_candidates(mut self, candidates: Vec<RenditionCandidate>) -> Self {
        self.default_candidates = Some(candidates);
        self
    }

    pub fn build(self) -> Result<TaggingPipeline> {
        let missing = |what: &str| TaggerError::InvalidInput(format!("pipeline is missing a {}", what));

        let default_candidates = self
            .default_candidates
            .unwrap_or_else(|| crate::config::RenditionConfig::default().candidates);
        if default_candidates.is_empty() {
            return Err(TaggerError::InvalidInput("default rendition list is empty".to_string()));
        }

        Ok(TaggingPipeline {
            renditions: self.renditions.ok_or_else(|| missing("rendition source"))?,
            model: self.model.ok_or_else(|| missing("vision model"))?,
            stager: self.stager.ok_or_else(|| missing("payload stager"))?,
            primary: self.primary.ok_or_else(|| missing("primary metadata committer"))?,
            fallback: self.fallback,
            prompt_builder: PromptBuilder::new(),
            default_candidates,
        })
    }
}
