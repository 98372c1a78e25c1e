pub mod types;
pub mod config;
pub mod retry;
pub mod traits;
pub mod resolver;
pub mod prompt;
pub mod inference;
pub mod normalizer;
pub mod metadata;
pub mod staging;
pub mod timeline;
pub mod pipeline;

pub use types::*;
pub use config::{CommitConfig, InferenceConfig, RenditionConfig, TaggerConfig};
pub use resolver::RenditionResolver;
pub use prompt::PromptBuilder;
pub use inference::{InferenceClient, InferenceEndpoint};
pub use normalizer::normalize;
pub use metadata::{AssetsApiWriter, ContentNodeWriter, MetadataCommitter, WriteError};
pub use staging::{StagedPayload, TempDirStager};
pub use timeline::{Stage, StageRecord, StageStatus, Timeline};
pub use traits::{MetadataWriter, PayloadStager, RenditionSource, VisionModel};
pub use pipeline::{Credentials, PipelineBuilder, PipelineFailure, PipelineState, RunStatus, TaggingPipeline, TaggingReport, TaggingRequest};
