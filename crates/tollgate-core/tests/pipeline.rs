//! Full-pipeline tests: fast rules, cache replay, and arbiter fail-safety
//! composed through the decision engine, with the judgment service stubbed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use tollgate_core::arbiter::{
    ArbiterSettings, HttpJudgmentClient, JudgmentClient, JudgmentRequest, ModelArbiter,
    StubJudgmentClient,
};
use tollgate_core::cache::{CacheSettings, DecisionCache};
use tollgate_core::engine::{DecisionEngine, NullAuditSink};
use tollgate_core::error::ArbiterError;
use tollgate_core::request::ToolRequest;
use tollgate_core::rules::RuleSet;
use tollgate_core::verdict::{Verdict, VerdictSource};

/// Judgment client that counts invocations, so tests can assert the slow
/// tier was never reached.
struct CountingClient {
    calls: Arc<AtomicUsize>,
    response: String,
}

impl JudgmentClient for CountingClient {
    fn complete<'a>(
        &'a self,
        _request: &'a JudgmentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, ArbiterError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.response.clone())
        })
    }
}

/// Judgment client that is down for the first N calls, then answers.
struct RecoveringClient {
    failures_left: AtomicUsize,
    response: String,
}

impl JudgmentClient for RecoveringClient {
    fn complete<'a>(
        &'a self,
        _request: &'a JudgmentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, ArbiterError>> + Send + 'a>> {
        Box::pin(async move {
            if self
                .failures_left
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ArbiterError::Transport("connection refused".into()));
            }
            Ok(self.response.clone())
        })
    }
}

/// Judgment client standing in for an unreachable service.
struct UnreachableClient;

impl JudgmentClient for UnreachableClient {
    fn complete<'a>(
        &'a self,
        _request: &'a JudgmentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, ArbiterError>> + Send + 'a>> {
        Box::pin(async move { Err(ArbiterError::Transport("connection refused".into())) })
    }
}

fn engine_with(
    dir: &TempDir,
    client: Box<dyn JudgmentClient>,
    ttl: Duration,
) -> DecisionEngine {
    DecisionEngine::new(
        RuleSet::with_defaults(),
        DecisionCache::new(CacheSettings {
            enabled: true,
            ttl,
            path: dir.path().join("cache.json"),
        }),
        ModelArbiter::new(
            client,
            ArbiterSettings {
                max_tokens: 512,
                auto_update_policy: true,
                ..Default::default()
            },
        ),
        Box::new(NullAuditSink),
    )
}

#[tokio::test]
async fn destructive_command_is_denied_without_network() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = engine_with(
        &dir,
        Box::new(CountingClient {
            calls: calls.clone(),
            response: r#"{"decision": "allow", "reason": "should never be consulted"}"#.into(),
        }),
        Duration::from_secs(3600),
    );

    let request = ToolRequest::new("Bash", json!({"command": "rm -rf /"}));
    let ruling = engine.evaluate(&request).await;

    assert!(matches!(ruling.verdict, Verdict::Deny { .. }));
    assert_eq!(ruling.source, VerdictSource::Fast);
    assert_eq!(calls.load(Ordering::Relaxed), 0, "judgment service must not be called");
    assert!(engine.cache().live_entries().is_empty(), "fast denials are not cached");
}

#[tokio::test]
async fn allow_listed_tool_ignores_judgment_availability() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(&dir, Box::new(UnreachableClient), Duration::from_secs(3600));

    let request = ToolRequest::new("Read", json!({"path": "/any/file"}));
    let ruling = engine.evaluate(&request).await;

    assert!(matches!(ruling.verdict, Verdict::Allow { .. }));
    assert_eq!(ruling.source, VerdictSource::Fast);
}

#[tokio::test]
async fn identical_request_replays_from_cache() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = engine_with(
        &dir,
        Box::new(CountingClient {
            calls: calls.clone(),
            response: r#"{"decision": "deny", "reason": "touches shared infrastructure"}"#.into(),
        }),
        Duration::from_secs(3600),
    );

    let request = ToolRequest::new("Bash", json!({"command": "kubectl delete pod web-1"}));

    let first = engine.evaluate(&request).await;
    assert_eq!(first.source, VerdictSource::Model);

    let second = engine.evaluate(&request).await;
    assert_eq!(second.source, VerdictSource::Cache);
    assert!(matches!(second.verdict, Verdict::Deny { .. }));
    assert_eq!(calls.load(Ordering::Relaxed), 1, "one judgment for two requests");
}

#[tokio::test]
async fn key_order_does_not_defeat_the_cache() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = engine_with(
        &dir,
        Box::new(CountingClient {
            calls: calls.clone(),
            response: r#"{"decision": "allow", "reason": "project-scoped edit"}"#.into(),
        }),
        Duration::from_secs(3600),
    );

    let mut forward = serde_json::Map::new();
    forward.insert("file_path".into(), json!("src/lib.rs"));
    forward.insert("old_string".into(), json!("a"));
    let mut reversed = serde_json::Map::new();
    reversed.insert("old_string".into(), json!("a"));
    reversed.insert("file_path".into(), json!("src/lib.rs"));

    engine
        .evaluate(&ToolRequest::new("Edit", serde_json::Value::Object(forward)))
        .await;
    let second = engine
        .evaluate(&ToolRequest::new("Edit", serde_json::Value::Object(reversed)))
        .await;

    assert_eq!(second.source, VerdictSource::Cache);
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn expired_entry_forces_re_evaluation() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = engine_with(
        &dir,
        Box::new(CountingClient {
            calls: calls.clone(),
            response: r#"{"decision": "allow", "reason": "routine"}"#.into(),
        }),
        Duration::from_secs(0),
    );

    let request = ToolRequest::new("Edit", json!({"file_path": "src/lib.rs"}));
    engine.evaluate(&request).await;

    // Backdate the stored entry past the zero TTL.
    let path = dir.path().join("cache.json");
    let mut store: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    for (_, entry) in store.as_object_mut().unwrap() {
        entry["created_at"] = json!(1);
    }
    std::fs::write(&path, store.to_string()).unwrap();

    let again = engine.evaluate(&request).await;
    assert_eq!(again.source, VerdictSource::Model);
    assert_eq!(calls.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn unreachable_judgment_service_denies() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(&dir, Box::new(UnreachableClient), Duration::from_secs(3600));

    let request = ToolRequest::new("Bash", json!({"command": "terraform apply"}));
    let ruling = engine.evaluate(&request).await;

    assert_eq!(ruling.source, VerdictSource::Model);
    match ruling.verdict {
        Verdict::Deny { reason } => assert!(reason.contains("connection refused")),
        other => panic!("expected deny, got {other:?}"),
    }
}

#[tokio::test]
async fn outage_deny_is_not_replayed_after_recovery() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(
        &dir,
        Box::new(RecoveringClient {
            failures_left: AtomicUsize::new(1),
            response: r#"{"decision": "allow", "reason": "routine project command"}"#.into(),
        }),
        Duration::from_secs(3600),
    );

    let request = ToolRequest::new("Bash", json!({"command": "make test"}));

    let during_outage = engine.evaluate(&request).await;
    assert_eq!(during_outage.source, VerdictSource::Model);
    assert!(matches!(during_outage.verdict, Verdict::Deny { .. }));
    assert!(
        engine.cache().live_entries().is_empty(),
        "an outage deny must not persist as precedent"
    );

    // Once the service answers again, the same request gets a real judgment
    // instead of a cached replay of the outage.
    let after_recovery = engine.evaluate(&request).await;
    assert_eq!(after_recovery.source, VerdictSource::Model);
    assert!(matches!(after_recovery.verdict, Verdict::Allow { .. }));
}

#[tokio::test]
async fn missing_credential_denies_with_cause() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(
        &dir,
        Box::new(HttpJudgmentClient::new(
            "http://localhost:1/v1".into(),
            "any-model".into(),
            None,
        )),
        Duration::from_secs(3600),
    );

    let request = ToolRequest::new("Bash", json!({"command": "npm publish"}));
    let ruling = engine.evaluate(&request).await;

    match ruling.verdict {
        Verdict::Deny { reason } => assert!(reason.contains("credential")),
        other => panic!("expected deny, got {other:?}"),
    }
}

#[tokio::test]
async fn passthrough_tool_is_never_cached() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(
        &dir,
        Box::new(StubJudgmentClient::new(vec![])),
        Duration::from_secs(3600),
    );

    let request = ToolRequest::new("AskUserQuestion", json!({}));
    for _ in 0..2 {
        let ruling = engine.evaluate(&request).await;
        assert!(matches!(ruling.verdict, Verdict::Passthrough { .. }));
        assert_eq!(ruling.source, VerdictSource::Fast);
    }
    assert!(engine.cache().live_entries().is_empty());
}

#[tokio::test]
async fn different_project_roots_are_distinct_precedents() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = engine_with(
        &dir,
        Box::new(CountingClient {
            calls: calls.clone(),
            response: r#"{"decision": "allow", "reason": "project build"}"#.into(),
        }),
        Duration::from_secs(3600),
    );

    let mut alpha = ToolRequest::new("Bash", json!({"command": "make install"}));
    alpha.project_root = Some("/work/alpha".into());
    let mut beta = alpha.clone();
    beta.project_root = Some("/work/beta".into());

    engine.evaluate(&alpha).await;
    let ruling = engine.evaluate(&beta).await;

    assert_eq!(ruling.source, VerdictSource::Model);
    assert_eq!(calls.load(Ordering::Relaxed), 2, "each scope gets its own judgment");
}
