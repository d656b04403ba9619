use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A tool invocation awaiting a permission decision.
///
/// `tool_input` is an open mapping whose shape depends on the tool; the
/// pipeline pattern-matches or serializes it but never interprets it as code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    /// Resolved project scope; a cache-key and prompt-context dimension only.
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    /// Opaque correlation token, logging only.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ToolRequest {
    pub fn new(tool_name: impl Into<String>, tool_input: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_input,
            project_root: None,
            session_id: None,
        }
    }

    /// Compute the cache fingerprint: SHA-256 over the canonical form of
    /// `(tool_name, tool_input, project_root-or-empty)`.
    ///
    /// Identical requests in different project scopes are distinct entries.
    pub fn fingerprint(&self) -> String {
        let root = self
            .project_root
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let payload = format!(
            "{}\n{}\n{}",
            self.tool_name,
            canonical_json(&self.tool_input),
            root
        );
        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// The serialized input text that pattern rules match against.
    pub fn input_text(&self) -> String {
        canonical_json(&self.tool_input)
    }

    /// The shell command carried by this request, when present.
    pub fn shell_command(&self) -> Option<&str> {
        self.tool_input.get("command").and_then(Value::as_str)
    }
}

/// Serialize a JSON value with object keys recursively sorted.
///
/// Map iteration order must never leak into fingerprints: two structurally
/// identical inputs with different key order must serialize identically.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .iter()
                .map(|key| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(key).unwrap_or_default(),
                        canonical_json(&map[key.as_str()])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let elements: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", elements.join(","))
        }
        other => other.to_string(),
    }
}
