use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::request::ToolRequest;
use crate::verdict::Verdict;

/// Operator-supplied pattern lists, already validated by the config layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorPolicy {
    #[serde(default)]
    pub deny_patterns: Vec<String>,
    #[serde(default)]
    pub allow_patterns: Vec<String>,
    #[serde(default)]
    pub passthrough_patterns: Vec<String>,
}

/// Which request fields a rule is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTarget {
    /// Tool name or the canonical serialized input.
    NameOrInput,
    /// Tool name only.
    Name,
    /// The `command` field of a shell-class tool.
    ShellCommand,
}

/// Rule categories in evaluation order.
///
/// Every deny category precedes every allow category; an allow pattern can
/// never mask a destructive command. Do not reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RuleCategory {
    OperatorDeny,
    DestructiveCommand,
    WorkflowAllow,
    OperatorAllow,
    OperatorPassthrough,
}

#[derive(Debug)]
struct CompiledRule {
    category: RuleCategory,
    target: RuleTarget,
    pattern: Regex,
    description: String,
}

impl CompiledRule {
    fn matches(&self, request: &ToolRequest) -> bool {
        match self.target {
            RuleTarget::Name => self.pattern.is_match(&request.tool_name),
            RuleTarget::NameOrInput => {
                self.pattern.is_match(&request.tool_name)
                    || self.pattern.is_match(&request.input_text())
            }
            RuleTarget::ShellCommand => {
                is_shell_tool(&request.tool_name)
                    && request
                        .shell_command()
                        .is_some_and(|command| self.pattern.is_match(command))
            }
        }
    }

    fn verdict(&self) -> Verdict {
        match self.category {
            RuleCategory::OperatorDeny => Verdict::Deny {
                reason: format!("operator deny rule: {}", self.description),
            },
            RuleCategory::DestructiveCommand => Verdict::Deny {
                reason: format!("destructive command: {}", self.description),
            },
            RuleCategory::WorkflowAllow => Verdict::Allow {
                reason: format!("known developer workflow: {}", self.description),
            },
            RuleCategory::OperatorAllow => Verdict::Allow {
                reason: format!("operator allow rule: {}", self.description),
            },
            RuleCategory::OperatorPassthrough => Verdict::Passthrough {
                reason: format!("operator passthrough rule: {}", self.description),
            },
        }
    }
}

/// Tool names with shell-execution capability.
pub const SHELL_TOOLS: &[&str] = &["Bash"];

/// Tools that fundamentally require a human response.
pub const PASSTHROUGH_TOOLS: &[&str] = &["AskUserQuestion", "ExitPlanMode"];

/// Read-only or low-risk tools allowed without further evaluation.
pub const ALLOWED_TOOLS: &[&str] = &[
    "Read",
    "Glob",
    "Grep",
    "LS",
    "NotebookRead",
    "TodoRead",
    "TodoWrite",
    "WebSearch",
];

/// Trusted extension-protocol namespace.
pub const TRUSTED_NAMESPACE_PREFIX: &str = "mcp__";

pub fn is_shell_tool(tool_name: &str) -> bool {
    SHELL_TOOLS.contains(&tool_name)
}

/// Ordered fast-path rule table.
///
/// Evaluation is a pure fold over the compiled rules followed by the fixed
/// tool-name lists; first match wins. No I/O, no mutation.
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile the rule table once from operator configuration.
    ///
    /// An operator pattern that fails to compile is skipped with a
    /// diagnostic and treated as non-matching; it never aborts evaluation.
    pub fn compile(policy: &OperatorPolicy) -> Self {
        let mut rules = Vec::new();

        push_operator_rules(
            &mut rules,
            &policy.deny_patterns,
            RuleCategory::OperatorDeny,
            RuleTarget::NameOrInput,
        );
        push_builtin_rules(
            &mut rules,
            DESTRUCTIVE_COMMAND_PATTERNS,
            RuleCategory::DestructiveCommand,
            RuleTarget::ShellCommand,
        );
        push_builtin_rules(
            &mut rules,
            WORKFLOW_ALLOW_PATTERNS,
            RuleCategory::WorkflowAllow,
            RuleTarget::ShellCommand,
        );
        push_operator_rules(
            &mut rules,
            &policy.allow_patterns,
            RuleCategory::OperatorAllow,
            RuleTarget::Name,
        );
        push_operator_rules(
            &mut rules,
            &policy.passthrough_patterns,
            RuleCategory::OperatorPassthrough,
            RuleTarget::NameOrInput,
        );

        Self { rules }
    }

    pub fn with_defaults() -> Self {
        Self::compile(&OperatorPolicy::default())
    }

    /// Evaluate the fast tier. `Defer` means no rule applies and the next
    /// tier should be consulted.
    pub fn evaluate(&self, request: &ToolRequest) -> Verdict {
        for rule in &self.rules {
            if rule.matches(request) {
                let verdict = rule.verdict();
                tracing::debug!(
                    tool = %request.tool_name,
                    category = ?rule.category,
                    rule = %rule.description,
                    decision = verdict.label(),
                    "fast rule matched"
                );
                return verdict;
            }
        }

        if PASSTHROUGH_TOOLS.contains(&request.tool_name.as_str()) {
            return Verdict::Passthrough {
                reason: format!("'{}' requires an interactive human response", request.tool_name),
            };
        }

        if ALLOWED_TOOLS.contains(&request.tool_name.as_str()) {
            return Verdict::Allow {
                reason: format!("'{}' is a read-only or low-risk tool", request.tool_name),
            };
        }

        if request.tool_name.starts_with(TRUSTED_NAMESPACE_PREFIX) {
            return Verdict::Allow {
                reason: format!(
                    "'{}' belongs to the trusted extension namespace",
                    request.tool_name
                ),
            };
        }

        Verdict::Defer
    }
}

fn push_operator_rules(
    rules: &mut Vec<CompiledRule>,
    patterns: &[String],
    category: RuleCategory,
    target: RuleTarget,
) {
    for pattern in patterns {
        match Regex::new(pattern) {
            Ok(compiled) => rules.push(CompiledRule {
                category,
                target,
                pattern: compiled,
                description: pattern.clone(),
            }),
            Err(e) => {
                tracing::warn!(
                    pattern = %pattern,
                    category = ?category,
                    error = %e,
                    "invalid operator pattern skipped"
                );
            }
        }
    }
}

fn push_builtin_rules(
    rules: &mut Vec<CompiledRule>,
    patterns: &[(&str, &str)],
    category: RuleCategory,
    target: RuleTarget,
) {
    for (pattern, description) in patterns {
        match Regex::new(pattern) {
            Ok(compiled) => rules.push(CompiledRule {
                category,
                target,
                pattern: compiled,
                description: (*description).to_string(),
            }),
            Err(e) => {
                // Built-in patterns are covered by tests; reaching this
                // means a broken release, so make it loud.
                tracing::error!(pattern = %pattern, error = %e, "built-in pattern failed to compile");
            }
        }
    }
}

/// Shell idioms that are always denied, regardless of any allow rule.
const DESTRUCTIVE_COMMAND_PATTERNS: &[(&str, &str)] = &[
    (
        r#"(?i)\brm\s+(?:--?[a-z-]+\s+)*--?[a-z-]*r[a-z-]*\s+(?:--?[a-z-]+\s+)*['"]?(?:/\*|/|~/|~|\$HOME|/home/[a-z0-9_.-]+/?)['"]?\s*(?:$|[;&|])"#,
        "recursive delete of a filesystem root or home directory",
    ),
    (
        r#"(?i)\b(?:rd|rmdir)\s+(?:/[sq]\s+)+"?[a-z]:\\"#,
        "recursive delete of a Windows drive root",
    ),
    (
        r#"(?i)\bdel\s+(?:/[a-z]\s+)+"?[a-z]:\\"#,
        "forced delete under a Windows drive root",
    ),
    (
        r"(?i)\bformat(?:\.com)?\s+[a-z]:",
        "disk format of a Windows volume",
    ),
    (
        r"(?i)\bmkfs(?:\.[a-z0-9]+)?\s",
        "filesystem creation over an existing device",
    ),
    (r"(?i)\bwipefs\b", "filesystem signature wipe"),
    (
        r"(?i)\bdiskpart\b.*\b(?:delete|clean)\b",
        "partition delete via diskpart",
    ),
    (
        r"(?i)\bparted\b.*\brm\b",
        "partition delete via parted",
    ),
    (
        r"(?i)\bdd\b[^|;&]*\bof=/dev/(?:sd|hd|nvme|mmcblk|vd|disk)",
        "raw write to a block device",
    ),
    (
        r"(?i)>\s*/dev/(?:sd|hd|nvme|mmcblk|vd)[a-z0-9]*",
        "redirect onto a block device",
    ),
    (
        r"(?i)\bgit\s+push\b[^;|&]*\s(?:--force(?:-with-lease(?:=\S*)?)?|-f)\b[^;|&]*\s(?:main|master|develop|release(?:/\S+)?)\b",
        "force-push to a protected branch",
    ),
    (
        r"(?i)\bgit\s+push\b[^;|&]*\s(?:main|master|develop|release(?:/\S+)?)\b[^;|&]*\s(?:--force(?:-with-lease(?:=\S*)?)?|-f)\b",
        "force-push to a protected branch",
    ),
    (
        r"(?i)\bgit\s+push\b[^;|&]*\s\+(?:main|master|develop|release)\b",
        "force-push to a protected branch",
    ),
    (
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&?\s*\}\s*;?\s*:",
        "fork bomb",
    ),
    (
        r"(?i)\b(?:curl|wget)\b[^;]*\|\s*(?:ba|z|da|fi)?sh\b.*(?:secret|token|api[_-]?key|passwd|password|credential)",
        "remote script piped into a shell alongside secret material",
    ),
    (
        r"(?i)(?:secret|token|api[_-]?key|passwd|password|credential)[^;]*\b(?:curl|wget)\b[^;]*\|\s*(?:ba|z|da|fi)?sh\b",
        "remote script piped into a shell alongside secret material",
    ),
    (
        r"(?i)\b(?:curl|wget|nc|ncat|scp|rsync)\b[^;]*(?:/etc/shadow|/etc/passwd|\.ssh/id_[a-z0-9]+|\.aws/credentials|\.netrc|\.npmrc|\.pypirc)",
        "system credential file sent over the network",
    ),
    (
        r"(?i)(?:/etc/shadow|\.ssh/id_[a-z0-9]+|\.aws/credentials|\.netrc)[^;]*\|\s*(?:curl|wget|nc|ncat)\b",
        "system credential file piped to a network client",
    ),
];

/// Narrow shell idioms safe to allow without a model judgment.
///
/// These run after the destructive checks, so a crafted command cannot
/// combine a destructive idiom with an allow-trigger substring.
const WORKFLOW_ALLOW_PATTERNS: &[(&str, &str)] = &[
    (
        r#"(?i)^\s*source\s+\.env[\w.-]*\s*&&\s*psql\b[^;|&]*-c\s+['"]\s*select\b"#,
        "sourced env file with a read-only psql query",
    ),
    (
        r"(?i)^\s*git\s+(?:status|log|diff)(?:\s+[^;|&><]*)?$",
        "read-only git inspection",
    ),
    (
        r"(?i)^\s*cargo\s+(?:check|clippy|fmt|metadata)(?:\s+[^;|&><]*)?$",
        "local cargo hygiene command",
    ),
];
