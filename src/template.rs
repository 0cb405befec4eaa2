//! Template interpolation for endpoint descriptors
//!
//! Handles `{{ variable }}` interpolation in URL templates and GraphQL
//! variable objects. Variables come from the target being harvested, e.g.
//! `repos/{{ repository }}/issues` or `{"owner": "{{ owner }}"}`.

use crate::error::{Error, Result};
use crate::types::{canonical_repo, JsonObject, JsonValue};
use regex::Regex;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}\}").unwrap()
});

/// Arguments available to a template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetArgs {
    vars: JsonObject,
}

impl TargetArgs {
    /// Create an empty argument set
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments for a repository target
    ///
    /// Sets `repository` (canonical `owner/repo`) and, when the reference has
    /// both parts, `owner` and `repo`.
    pub fn repository(reference: &str) -> Self {
        let repository = canonical_repo(reference);
        let mut args = Self::new().with("repository", repository.as_str());
        if let Some((owner, repo)) = repository.split_once('/') {
            args = args.with("owner", owner).with("repo", repo);
        }
        args
    }

    /// Add or replace a variable
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Look up a variable
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.vars.get(name)
    }
}

/// Render a template string with the given arguments
pub fn render(template: &str, args: &TargetArgs) -> Result<String> {
    let mut result = template.to_string();
    let mut missing = Vec::new();

    for cap in TEMPLATE_REGEX.captures_iter(template) {
        let (Some(full_match), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        match args.get(name.as_str()) {
            Some(value) => {
                result = result.replace(full_match.as_str(), &value_to_string(value));
            }
            None => missing.push(name.as_str().to_string()),
        }
    }

    if missing.is_empty() {
        Ok(result)
    } else {
        Err(Error::undefined_var(missing.join(", ")))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Extract all variable names from a template
pub fn extract_variables(template: &str) -> Vec<String> {
    TEMPLATE_REGEX
        .captures_iter(template)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Convert a JSON value to a string for template substitution
fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Render all string values in a JSON value
///
/// A string that is exactly one placeholder keeps the argument's JSON type,
/// so `"{{ number }}"` renders to a number, not `"42"`.
pub fn render_value(value: &JsonValue, args: &TargetArgs) -> Result<JsonValue> {
    match value {
        JsonValue::String(s) => {
            if !has_templates(s) {
                return Ok(value.clone());
            }
            if let Some(cap) = TEMPLATE_REGEX.captures(s) {
                let whole = cap.get(0).is_some_and(|m| m.as_str() == s.as_str());
                if let (true, Some(name)) = (whole, cap.get(1)) {
                    return args
                        .get(name.as_str())
                        .cloned()
                        .ok_or_else(|| Error::undefined_var(name.as_str()));
                }
            }
            Ok(JsonValue::String(render(s, args)?))
        }
        JsonValue::Object(map) => {
            let mut new_map = JsonObject::new();
            for (k, v) in map {
                new_map.insert(k.clone(), render_value(v, args)?);
            }
            Ok(JsonValue::Object(new_map))
        }
        JsonValue::Array(arr) => {
            let new_arr: Result<Vec<JsonValue>> = arr.iter().map(|v| render_value(v, args)).collect();
            Ok(JsonValue::Array(new_arr?))
        }
        _ => Ok(value.clone()),
    }
}
