use crate::types::{PropertySet, Result, TaggerError};
use serde_json::Value;
use tracing::{debug, warn};

/// Parses the model's answer into namespaced properties.
///
/// An absent or blank answer yields an empty set. Anything else must be a
/// JSON object; parse failures are returned as-is and never retried here.
pub fn normalize(raw_answer: Option<&str>) -> Result<PropertySet> {
    let Some(raw) = raw_answer.map(str::trim).filter(|s| !s.is_empty()) else {
        warn!("No results received from inference");
        return Ok(PropertySet::new());
    };

    let parsed: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| TaggerError::MalformedInferenceResult(format!("{}: {}", e, excerpt_line(raw))))?;

    let Value::Object(entries) = parsed else {
        return Err(TaggerError::MalformedInferenceResult(format!(
            "expected a JSON object, got: {}",
            excerpt_line(raw)
        )));
    };

    let properties: PropertySet = entries
        .into_iter()
        .map(|(key, value)| (namespaced_key(&key), value))
        .collect();

    debug!("Normalized {} properties", properties.len());
    Ok(properties)
}

/// `aigen_brand` -> `aigen:brand`. Only the first underscore is a namespace separator.
pub fn namespaced_key(key: &str) -> String {
    key.replacen('_', ":", 1)
}

/// Models sometimes wrap the JSON in a fenced block despite being told not to.
fn strip_code_fence(raw: &str) -> &str {
    let Some(inner) = raw.strip_prefix("```") else {
        return raw;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // drop the info string (`json`) on the opening line
    match inner.split_once('\n') {
        Some((info, body)) if !info.trim_start().starts_with('{') => body.trim(),
        _ => inner.trim(),
    }
}

fn excerpt_line(raw: &str) -> String {
    crate::types::excerpt(raw, 120)
}
