use crate::arbiter::ModelArbiter;
use crate::cache::{CachedDecision, DecisionCache, unix_now};
use crate::request::ToolRequest;
use crate::rules::RuleSet;
use crate::verdict::{DecisionLogEntry, Ruling, Verdict, VerdictSource};

/// Sink for append-only decision records.
///
/// The engine builds one record per decided request; persistence belongs to
/// the caller's logging collaborator.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &DecisionLogEntry);
}

/// Sink that drops records, for tests and disabled logging.
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _entry: &DecisionLogEntry) {}
}

/// Pipeline position while one request is being decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Start,
    FastEvaluated,
    CacheEvaluated,
    ModelEvaluated,
    Done,
}

/// The decision orchestrator — sequences the three tiers.
///
/// Fast rules run first and short-circuit on any non-Defer verdict. A Defer
/// falls to the cache; a miss falls to the model arbiter, whose verdict is
/// written back into the cache. Exactly one ruling and one audit record are
/// produced per request, and every arbiter failure resolves to a deny.
pub struct DecisionEngine {
    rules: RuleSet,
    cache: DecisionCache,
    arbiter: ModelArbiter,
    audit: Box<dyn AuditSink>,
}

impl DecisionEngine {
    pub fn new(
        rules: RuleSet,
        cache: DecisionCache,
        arbiter: ModelArbiter,
        audit: Box<dyn AuditSink>,
    ) -> Self {
        Self {
            rules,
            cache,
            arbiter,
            audit,
        }
    }

    /// Decide one request.
    pub async fn evaluate(&self, request: &ToolRequest) -> Ruling {
        let mut state = PipelineState::Start;
        let mut decided: Option<(Verdict, VerdictSource)> = None;

        while state != PipelineState::Done {
            state = match state {
                PipelineState::Start => PipelineState::FastEvaluated,

                PipelineState::FastEvaluated => match self.rules.evaluate(request) {
                    Verdict::Defer => {
                        tracing::debug!(tool = %request.tool_name, "no fast rule applies");
                        PipelineState::CacheEvaluated
                    }
                    verdict => {
                        decided = Some((verdict, VerdictSource::Fast));
                        PipelineState::Done
                    }
                },

                PipelineState::CacheEvaluated => {
                    match self.cache.lookup(&request.fingerprint()) {
                        Some(entry) => {
                            decided = Some((entry.replay_verdict(), VerdictSource::Cache));
                            PipelineState::Done
                        }
                        None => PipelineState::ModelEvaluated,
                    }
                }

                PipelineState::ModelEvaluated => {
                    let verdict = match self.arbiter.judge(request).await {
                        // Only a genuine judgment becomes cached precedent.
                        Ok(verdict) => {
                            if let (Some(decision), Some(reason)) =
                                (CachedDecision::classify(&verdict), verdict.reason())
                            {
                                self.cache
                                    .store(request.fingerprint(), decision, reason, request);
                            }
                            verdict
                        }
                        // The single fail-safe rule: every arbiter error
                        // kind collapses to a deny, never an allow. The
                        // deny is transient and stays out of the cache so
                        // a restored service is consulted again.
                        Err(e) => {
                            tracing::warn!(
                                tool = %request.tool_name,
                                error = %e,
                                "model judgment unavailable, denying"
                            );
                            Verdict::Deny {
                                reason: format!("model judgment unavailable: {e}"),
                            }
                        }
                    };

                    decided = Some((verdict, VerdictSource::Model));
                    PipelineState::Done
                }

                PipelineState::Done => PipelineState::Done,
            };
        }

        // Every transition into Done records a ruling; if an orchestration
        // bug ever breaks that, fall out conservatively.
        let (verdict, source) = decided.unwrap_or_else(|| {
            tracing::error!("pipeline terminated without a ruling, denying");
            (
                Verdict::Deny {
                    reason: "decision pipeline produced no ruling".into(),
                },
                VerdictSource::Fast,
            )
        });

        self.log_decision(request, &verdict, source);
        Ruling { verdict, source }
    }

    /// Administrative access to the decision cache.
    pub fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    fn log_decision(&self, request: &ToolRequest, verdict: &Verdict, source: VerdictSource) {
        let entry = DecisionLogEntry {
            tool_name: request.tool_name.clone(),
            decision: verdict.label().to_string(),
            reason: verdict.reason().unwrap_or_default().to_string(),
            source,
            session_id: request.session_id.clone(),
            project_root: request
                .project_root
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            timestamp: unix_now(),
        };
        self.audit.record(&entry);

        tracing::info!(
            tool = %entry.tool_name,
            decision = %entry.decision,
            source = %source,
            reason = %entry.reason,
            "request decided"
        );
    }
}
