use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Caller-supplied tagging configuration, kept in the order it was received.
pub type ConfigMap = Map<String, Value>;

/// Flat set of namespaced properties destined for the asset's metadata node.
pub type PropertySet = BTreeMap<String, Value>;

/// Reference to one asset in the remote content repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    /// Repository path, e.g. `/content/dam/brand/shoe.jpg`.
    pub path: String,
    /// Repository base URL without trailing slash.
    pub base_url: String,
}

impl AssetRef {
    pub fn new(path: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        match self.path.rsplit_once('/') {
            Some((_, name)) => name,
            None => &self.path,
        }
    }

    /// Parent folder of the asset, `.` when the path has no folder part.
    pub fn parent_folder(&self) -> &str {
        match self.path.rsplit_once('/') {
            Some(("", _)) => "/",
            Some((parent, _)) => parent,
            None => ".",
        }
    }
}

/// One entry of the rendition fallback chain. Position in the list is its rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionCandidate {
    pub suffix: String,
}

impl RenditionCandidate {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self { suffix: suffix.into() }
    }
}

impl From<&str> for RenditionCandidate {
    fn from(suffix: &str) -> Self {
        Self::new(suffix)
    }
}

/// Binary rendition fetched from the repository.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub bytes: Vec<u8>,
    pub byte_length: usize,
    pub content_type: Option<String>,
    pub candidate: RenditionCandidate,
    pub candidate_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSpec {
    pub prompt_text: String,
    pub namespace_map: BTreeMap<String, String>,
}
