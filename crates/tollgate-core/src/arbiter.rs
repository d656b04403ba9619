use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde::Deserialize;

use crate::error::ArbiterError;
use crate::policy_doc::{PersistedPolicyDoc, resolve_policy_text};
use crate::request::ToolRequest;
use crate::verdict::Verdict;

/// Project-relative file whose contents are appended verbatim to the system
/// instruction, read fresh on every arbiter call.
pub const PROJECT_POLICY_FILE: &str = ".tollgate-policy.md";

/// One system/user exchange with the judgment service.
#[derive(Debug, Clone)]
pub struct JudgmentRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
}

/// Facade over the judgment endpoint so tests can stub the network.
pub trait JudgmentClient: Send + Sync {
    fn complete<'a>(
        &'a self,
        request: &'a JudgmentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, ArbiterError>> + Send + 'a>>;
}

/// OpenAI-compatible chat-completion client.
///
/// One HTTP request per invocation: zero temperature, bounded output,
/// no retries. A missing credential fails before any network traffic.
pub struct HttpJudgmentClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpJudgmentClient {
    pub fn new(base_url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            model,
            api_key,
        }
    }
}

impl JudgmentClient for HttpJudgmentClient {
    fn complete<'a>(
        &'a self,
        request: &'a JudgmentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, ArbiterError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(api_key) = &self.api_key else {
                return Err(ArbiterError::MissingCredential);
            };

            let body = serde_json::json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": request.system_prompt},
                    {"role": "user", "content": request.user_prompt},
                ],
                "max_tokens": request.max_tokens,
                "temperature": 0,
            });

            let url = format!("{}/chat/completions", self.base_url);
            let resp = self
                .http
                .post(&url)
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| ArbiterError::Transport(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(ArbiterError::BadStatus { status, body });
            }

            let json: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| ArbiterError::Transport(e.to_string()))?;

            let content = json["choices"][0]["message"]["content"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            if content.trim().is_empty() {
                return Err(ArbiterError::EmptyResponse);
            }
            Ok(content)
        })
    }
}

/// Stub client returning canned responses, for tests and dry runs.
pub struct StubJudgmentClient {
    responses: Vec<String>,
    call_count: std::sync::atomic::AtomicUsize,
}

impl StubJudgmentClient {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            call_count: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// A stub that always returns the given response.
    pub fn constant(response: &str) -> Self {
        Self::new(vec![response.to_string()])
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl JudgmentClient for StubJudgmentClient {
    fn complete<'a>(
        &'a self,
        _request: &'a JudgmentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, ArbiterError>> + Send + 'a>> {
        Box::pin(async move {
            let idx = self
                .call_count
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            if self.responses.is_empty() {
                return Err(ArbiterError::EmptyResponse);
            }
            Ok(self.responses[idx % self.responses.len()].clone())
        })
    }
}

/// Arbiter configuration, consumed from the config layer.
#[derive(Debug, Clone, Default)]
pub struct ArbiterSettings {
    pub persisted_policy: Option<PersistedPolicyDoc>,
    pub auto_update_policy: bool,
    pub max_tokens: u32,
    /// Paths to be treated as equivalent to the project root.
    pub trusted_paths: Vec<PathBuf>,
}

/// The slow tier: asks the judgment service for an allow/deny ruling.
///
/// This tier never defers and never passes through; ambiguity resolves to a
/// judgment call, and every failure is an error the orchestrator collapses
/// to a deny.
pub struct ModelArbiter {
    client: Box<dyn JudgmentClient>,
    settings: ArbiterSettings,
}

impl ModelArbiter {
    pub fn new(client: Box<dyn JudgmentClient>, settings: ArbiterSettings) -> Self {
        Self { client, settings }
    }

    pub async fn judge(&self, request: &ToolRequest) -> Result<Verdict, ArbiterError> {
        let judgment_request = JudgmentRequest {
            system_prompt: self.system_prompt(request),
            user_prompt: self.user_prompt(request),
            max_tokens: self.settings.max_tokens,
        };

        let raw = self.client.complete(&judgment_request).await?;
        let judgment = parse_judgment(&raw)?;

        tracing::info!(
            tool = %request.tool_name,
            decision = ?judgment.decision,
            reason = %judgment.reason,
            "model judgment rendered"
        );

        Ok(match judgment.decision {
            JudgmentKind::Allow => Verdict::Allow {
                reason: judgment.reason,
            },
            JudgmentKind::Deny => Verdict::Deny {
                reason: judgment.reason,
            },
        })
    }

    fn system_prompt(&self, request: &ToolRequest) -> String {
        let mut prompt = resolve_policy_text(
            self.settings.persisted_policy.as_ref(),
            self.settings.auto_update_policy,
        )
        .to_string();

        // Per-project policy is re-read on every call so edits apply
        // to the very next request.
        if let Some(root) = &request.project_root
            && let Ok(project_policy) = std::fs::read_to_string(root.join(PROJECT_POLICY_FILE))
        {
            prompt.push_str("\n\n## Project policy\n\n");
            prompt.push_str(&project_policy);
        }

        if !self.settings.trusted_paths.is_empty() {
            prompt.push_str("\n\nTreat these paths as equivalent to the project root:\n");
            for path in &self.settings.trusted_paths {
                prompt.push_str(&format!("- {}\n", path.display()));
            }
        }

        prompt
    }

    fn user_prompt(&self, request: &ToolRequest) -> String {
        let root = request
            .project_root
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());

        let trusted_note = if self.settings.trusted_paths.is_empty() {
            String::new()
        } else {
            format!(
                "Trusted paths: {}\n",
                self.settings
                    .trusted_paths
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };

        format!(
            "Tool: {}\nProject root: {}\n{}Parameters:\n{}",
            request.tool_name,
            root,
            trusted_note,
            serde_json::to_string_pretty(&request.tool_input)
                .unwrap_or_else(|_| request.tool_input.to_string()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum JudgmentKind {
    Allow,
    Deny,
}

#[derive(Debug, Deserialize)]
struct Judgment {
    decision: JudgmentKind,
    reason: String,
}

/// Validate a raw judgment against the strict two-field schema: exactly
/// allow/deny plus a non-empty reason. Markdown fences are stripped first.
fn parse_judgment(raw: &str) -> Result<Judgment, ArbiterError> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if cleaned.is_empty() {
        return Err(ArbiterError::EmptyResponse);
    }

    let judgment: Judgment = serde_json::from_str(cleaned)
        .map_err(|e| ArbiterError::InvalidSchema(format!("{e}; raw: {raw}")))?;

    if judgment.reason.trim().is_empty() {
        return Err(ArbiterError::InvalidSchema("empty reason".into()));
    }

    Ok(judgment)
}
