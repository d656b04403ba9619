use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use tollgate_core::request::ToolRequest;
use tollgate_core::verdict::{Ruling, Verdict, VerdictSource};

/// Fixed reason attached to denials of unparseable input.
pub const MALFORMED_REQUEST_REASON: &str = "malformed permission request";

/// Markers whose presence names a directory as a project root.
pub const ROOT_MARKERS: &[&str] = &[".git", "Cargo.toml", "package.json", "pyproject.toml", "go.mod"];

/// Wire shape of a permission request arriving on stdin.
///
/// `tool_input` must be an object; any other shape fails schema validation.
#[derive(Debug, Deserialize)]
struct RawHookRequest {
    tool_name: String,
    tool_input: serde_json::Map<String, Value>,
    #[serde(default)]
    cwd: Option<PathBuf>,
    #[serde(default)]
    session_id: Option<String>,
}

/// Parse the incoming payload.
///
/// Malformed input resolves to an immediate deny ruling without any
/// pipeline tier being invoked.
pub fn parse_request(raw: &str) -> Result<ToolRequest, Ruling> {
    let parsed: RawHookRequest = match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting malformed permission request");
            return Err(Ruling {
                verdict: Verdict::Deny {
                    reason: MALFORMED_REQUEST_REASON.into(),
                },
                source: VerdictSource::Fast,
            });
        }
    };

    let project_root = parsed.cwd.as_deref().and_then(detect_project_root);

    Ok(ToolRequest {
        tool_name: parsed.tool_name,
        tool_input: Value::Object(parsed.tool_input),
        project_root,
        session_id: parsed.session_id,
    })
}

/// Walk up from `cwd` to the nearest directory carrying a project marker.
pub fn detect_project_root(cwd: &Path) -> Option<PathBuf> {
    cwd.ancestors()
        .find(|dir| ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()))
        .map(Path::to_path_buf)
}
