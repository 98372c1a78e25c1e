use crate::types::{AssetRef, ConfigMap, PromptSpec, Result, TaggerError};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
pub const RENDITION_NAMESPACE: &str = "http://ns.adobe.com/rendition/1.0/";

/// Configuration key carrying the namespace map.
pub const NAMESPACE_KEY: &str = "namespace";

/// Key whose value gets the asset's folder appended.
pub const BRAND_KEY: &str = "aigen_brand";

/// Transport-level keys that never reach the prompt.
pub const EXCLUDED_KEYS: [&str; 5] = ["embedBinaryLimit", "target", "userData", "worker", "fmt"];

pub const PREAMBLE: &str = "Please follow these tagging instructions for product images, then return the corresponding tags in JSON format. Please do not add any markdown or special formatting characters. Here are the suggested keys: ";

/// Turns tagging configuration into the instruction prompt. Pure and deterministic.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, config: &ConfigMap, asset_path: &str) -> Result<PromptSpec> {
        let asset = AssetRef::new(asset_path, "");
        let mut namespace_map = BTreeMap::new();
        let mut keys: Vec<&str> = Vec::new();
        let mut values = String::new();

        for (key, value) in config {
            if key == NAMESPACE_KEY {
                namespace_map = parse_namespaces(value)?;
                continue;
            }
            if EXCLUDED_KEYS.contains(&key.as_str()) {
                continue;
            }

            keys.push(key);
            if key == BRAND_KEY {
                let folder = asset.parent_folder();
                debug!("Asset folder path: {}", folder);
                values.push_str(&format!(
                    "{} Here is the folder path for reference:{}. ",
                    value_text(value),
                    folder
                ));
            } else {
                values.push_str(&value_text(value));
                values.push(' ');
            }
        }

        namespace_map.insert("dc".to_string(), DC_NAMESPACE.to_string());
        namespace_map.insert("rendition".to_string(), RENDITION_NAMESPACE.to_string());

        let mut prompt_text = String::from(PREAMBLE);
        prompt_text.push_str(&key_clause(&keys));
        prompt_text.push_str(&values);
        prompt_text.push_str(&format!(
            " Here is the file name as reference: {}.",
            asset.file_name()
        ));

        debug!("Generated prompt ({} chars): {}", prompt_text.len(), prompt_text);

        Ok(PromptSpec {
            prompt_text,
            namespace_map,
        })
    }
}

/// `a`, `b/c` -> `a, b, c. `; slashes inside key names become separators too.
fn key_clause(keys: &[&str]) -> String {
    if keys.is_empty() {
        return String::new();
    }
    format!("{}. ", keys.join("/")).replace('/', ", ")
}

/// Plain-text rendering of a config value: arrays flatten to comma-joined items.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(item_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn item_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => value_text(other),
    }
}

fn parse_namespaces(value: &Value) -> Result<BTreeMap<String, String>> {
    let parsed = match value {
        Value::String(encoded) => serde_json::from_str::<Value>(encoded)
            .map_err(|e| TaggerError::InvalidInput(format!("namespace is not valid JSON: {}", e)))?,
        other => other.clone(),
    };

    let Value::Object(entries) = parsed else {
        return Err(TaggerError::InvalidInput("namespace must be an object of prefix to URI".to_string()));
    };

    entries
        .into_iter()
        .map(|(prefix, uri)| match uri {
            Value::String(uri) => Ok((prefix, uri)),
            other => Err(TaggerError::InvalidInput(format!(
                "namespace '{}' must map to a string URI, got {}",
                prefix, other
            ))),
        })
        .collect()
}
