use crate::traits::PayloadStager;
use crate::types::{AssetRef, EncodedImage, FetchedPayload, Result, TaggerError};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

const FALLBACK_MEDIA_TYPE: &str = "image/jpeg";

/// A rendition written to local storage for the duration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPayload {
    pub path: PathBuf,
    pub media_type: String,
    pub byte_length: usize,
}

/// Stages renditions as uniquely named files under one directory.
#[derive(Debug, Clone)]
pub struct TempDirStager {
    dir: PathBuf,
}

impl TempDirStager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn file_name(asset: &AssetRef, payload: &FetchedPayload) -> String {
        let name = asset.file_name();
        let stem = match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        };
        let stem: String = stem
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let extension = payload
            .candidate
            .suffix
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.contains('/'))
            .unwrap_or("jpeg");
        format!("{}_{}.{}", stem, Uuid::new_v4(), extension)
    }
}

/// The declared content type when it is an image, JPEG otherwise.
pub fn media_type_of(payload: &FetchedPayload) -> String {
    payload
        .content_type
        .as_deref()
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .filter(|ct| ct.starts_with("image/"))
        .unwrap_or(FALLBACK_MEDIA_TYPE)
        .to_string()
}

#[async_trait]
impl PayloadStager for TempDirStager {
    async fn stage(&self, asset: &AssetRef, payload: &FetchedPayload) -> Result<StagedPayload> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name(asset, payload));
        if let Err(e) = tokio::fs::write(&path, &payload.bytes).await {
            // a partially written file would never be handed back for cleanup
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }
        debug!("Staged {} bytes at {}", payload.bytes.len(), path.display());

        Ok(StagedPayload {
            path,
            media_type: media_type_of(payload),
            byte_length: payload.bytes.len(),
        })
    }

    async fn encode(&self, staged: &StagedPayload) -> Result<EncodedImage> {
        let bytes = tokio::fs::read(&staged.path).await?;
        if bytes.len() != staged.byte_length {
            return Err(TaggerError::Staging(format!(
                "{} holds {} bytes, expected {}",
                staged.path.display(),
                bytes.len(),
                staged.byte_length
            )));
        }

        Ok(EncodedImage {
            base64: general_purpose::STANDARD.encode(&bytes),
            media_type: staged.media_type.clone(),
        })
    }

    async fn cleanup(&self, staged: &StagedPayload) -> Result<()> {
        tokio::fs::remove_file(&staged.path).await?;
        debug!("Removed staged file {}", staged.path.display());
        Ok(())
    }
}
