use serde_json::json;

use tollgate_core::verdict::{Ruling, Verdict};

/// Render the structured decision payload for stdout.
///
/// Passthrough (and the never-surfaced Defer) yields `None`: emitting
/// nothing signals the caller to fall back to its native interactive flow.
pub fn render_decision(ruling: &Ruling) -> Option<String> {
    let decision = match &ruling.verdict {
        Verdict::Allow { .. } => json!({"behavior": "allow"}),
        Verdict::Deny { reason } => json!({"behavior": "deny", "message": reason}),
        Verdict::Passthrough { .. } | Verdict::Defer => return None,
    };
    Some(json!({"eventName": "PermissionRequest", "decision": decision}).to_string())
}
