pub mod defs;

pub use defs::{AssetRef, ConfigMap, FetchedPayload, PromptSpec, PropertySet, RenditionCandidate};
