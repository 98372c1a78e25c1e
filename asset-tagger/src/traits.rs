use crate::metadata::WriteError;
use crate::staging::StagedPayload;
use crate::types::{AssetRef, EncodedImage, FetchedPayload, InferenceAnswer, PromptSpec, PropertySet, RenditionCandidate, Result, WritePath};
use async_trait::async_trait;

/// Fetches the best available rendition of an asset.
#[async_trait]
pub trait RenditionSource: Send + Sync {
    /// Tries `candidates` strictly in order and returns the first payload that downloads.
    async fn resolve(&self, asset: &AssetRef, candidates: &[RenditionCandidate]) -> Result<FetchedPayload>;
}

/// Vision-capable model that answers a prompt about an image.
#[async_trait]
pub trait VisionModel: Send + Sync {
    fn model_name(&self) -> String;

    /// An answer without content is not an error.
    async fn infer(&self, prompt: &PromptSpec, image: &EncodedImage) -> Result<InferenceAnswer>;
}

/// One way of writing a property set onto an asset's metadata.
#[async_trait]
pub trait MetadataWriter: Send + Sync {
    fn path(&self) -> WritePath;

    /// A single write attempt. `Ok` only when this path's success signal was observed.
    async fn write(&self, asset: &AssetRef, properties: &PropertySet) -> std::result::Result<(), WriteError>;
}

/// Local staging of a fetched rendition between download and encoding.
#[async_trait]
pub trait PayloadStager: Send + Sync {
    async fn stage(&self, asset: &AssetRef, payload: &FetchedPayload) -> Result<StagedPayload>;

    async fn encode(&self, staged: &StagedPayload) -> Result<EncodedImage>;

    async fn cleanup(&self, staged: &StagedPayload) -> Result<()>;
}
