use serde::{Deserialize, Serialize};

/// Outcome of one decision tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Request is approved to proceed.
    Allow { reason: String },
    /// Request is refused with a reason.
    Deny { reason: String },
    /// Terminal non-decision: a human must rule on this request.
    /// Never cached — automatic replay would defeat its meaning.
    Passthrough { reason: String },
    /// Fast tier only: no rule applies, continue to the next tier.
    /// Never surfaced to the caller.
    Defer,
}

impl Verdict {
    /// Only allow/deny verdicts may be persisted in the decision cache.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Verdict::Allow { .. } | Verdict::Deny { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Allow { reason }
            | Verdict::Deny { reason }
            | Verdict::Passthrough { reason } => Some(reason),
            Verdict::Defer => None,
        }
    }

    /// Lowercase tag for audit records and structured output.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Allow { .. } => "allow",
            Verdict::Deny { .. } => "deny",
            Verdict::Passthrough { .. } => "passthrough",
            Verdict::Defer => "defer",
        }
    }
}

/// Which tier produced a ruling, recorded for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictSource {
    Fast,
    Cache,
    Model,
}

impl std::fmt::Display for VerdictSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictSource::Fast => write!(f, "fast"),
            VerdictSource::Cache => write!(f, "cache"),
            VerdictSource::Model => write!(f, "model"),
        }
    }
}

/// A terminal verdict paired with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ruling {
    pub verdict: Verdict,
    pub source: VerdictSource,
}

/// Append-only audit record for one decided request.
///
/// The engine builds the record; persistence belongs to the caller's sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub tool_name: String,
    pub decision: String,
    pub reason: String,
    pub source: VerdictSource,
    pub session_id: Option<String>,
    pub project_root: Option<String>,
    pub timestamp: u64,
}
