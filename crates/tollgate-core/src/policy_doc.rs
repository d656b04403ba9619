use serde::{Deserialize, Serialize};

/// Version of the built-in baseline policy text. Bump on any edit.
pub const BASELINE_POLICY_VERSION: u32 = 3;

/// Baseline system instruction for the model arbiter.
pub const BASELINE_POLICY: &str = r#"You are a permission arbiter for an autonomous coding agent. You will receive one tool invocation (tool name, project root, and parameters) and must decide whether it may proceed.

Decision criteria:
- ALLOW: the operation is read-only, scoped to the project, or an ordinary development action (editing project files, running builds and tests, installing project dependencies, local git operations other than force-pushes to shared branches).
- DENY: the operation destroys data, touches files outside the project scope, exfiltrates secrets or credentials, rewrites shared VCS history, changes system-level configuration, or its purpose cannot be determined from the parameters.

When in doubt, deny. You must always decide; never ask for clarification.

Respond ONLY with valid JSON, no markdown, no explanation outside the JSON:
{"decision": "allow" | "deny", "reason": "one sentence explaining the decision"}"#;

/// A persisted copy of the policy text, as loaded by the config layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedPolicyDoc {
    pub version: u32,
    pub text: String,
}

/// Pick the policy text for one request.
///
/// A persisted copy that is behind the built-in version is substituted with
/// the current built-in text unless auto-update is disabled. The persisted
/// copy itself is never written here; the config collaborator owns it.
pub fn resolve_policy_text<'a>(
    persisted: Option<&'a PersistedPolicyDoc>,
    auto_update: bool,
) -> &'a str {
    match persisted {
        Some(doc) if doc.version >= BASELINE_POLICY_VERSION => &doc.text,
        Some(doc) if !auto_update => &doc.text,
        Some(doc) => {
            tracing::debug!(
                persisted = doc.version,
                current = BASELINE_POLICY_VERSION,
                "substituting stale persisted policy with built-in text"
            );
            BASELINE_POLICY
        }
        None => BASELINE_POLICY,
    }
}
