use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::ToolRequest;
use crate::verdict::Verdict;

/// Cache tuning, consumed from the config layer.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
    pub path: PathBuf,
}

/// The verdict classes a cache entry may hold. Passthrough is deliberately
/// unrepresentable here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachedDecision {
    Allow,
    Deny,
}

impl CachedDecision {
    /// Classify a verdict for storage; non-cacheable verdicts map to `None`.
    pub fn classify(verdict: &Verdict) -> Option<Self> {
        match verdict {
            Verdict::Allow { .. } => Some(CachedDecision::Allow),
            Verdict::Deny { .. } => Some(CachedDecision::Deny),
            Verdict::Passthrough { .. } | Verdict::Defer => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub decision: CachedDecision,
    pub reason: String,
    pub created_at: u64,
    pub tool_name: String,
    pub tool_input: Value,
    pub project_root: Option<String>,
}

impl CacheEntry {
    /// Rebuild the verdict for replay, with the reason marked as cached
    /// precedent so audit records show their origin.
    pub fn replay_verdict(&self) -> Verdict {
        let reason = format!("cached: {}", self.reason);
        match self.decision {
            CachedDecision::Allow => Verdict::Allow { reason },
            CachedDecision::Deny => Verdict::Deny { reason },
        }
    }
}

type Store = BTreeMap<String, CacheEntry>;

/// Content-addressed decision cache backed by a single JSON file.
///
/// The store is loaded wholesale and rewritten wholesale on any mutation;
/// concurrent writers are last-writer-wins, acceptable because the cache is
/// advisory — a dropped entry merely triggers re-evaluation.
pub struct DecisionCache {
    settings: CacheSettings,
}

impl DecisionCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self { settings }
    }

    /// Look up a fingerprint. An entry older than the TTL is evicted as a
    /// side effect and reported as a miss; expiry is lazy, never swept.
    pub fn lookup(&self, fingerprint: &str) -> Option<CacheEntry> {
        if !self.settings.enabled {
            return None;
        }

        let mut store = self.load();
        let entry = store.get(fingerprint)?.clone();

        if self.expired(&entry) {
            tracing::debug!(fingerprint = %fingerprint, "expired cache entry evicted");
            store.remove(fingerprint);
            self.persist(&store);
            return None;
        }

        tracing::debug!(fingerprint = %fingerprint, decision = ?entry.decision, "cache hit");
        Some(entry)
    }

    /// Persist a decision. No-op when the cache is disabled.
    pub fn store(
        &self,
        fingerprint: String,
        decision: CachedDecision,
        reason: &str,
        request: &ToolRequest,
    ) {
        if !self.settings.enabled {
            return;
        }

        let mut store = self.load();
        store.insert(
            fingerprint,
            CacheEntry {
                decision,
                reason: reason.to_string(),
                created_at: unix_now(),
                tool_name: request.tool_name.clone(),
                tool_input: request.tool_input.clone(),
                project_root: request
                    .project_root
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            },
        );
        self.persist(&store);
    }

    /// Drop every entry. Returns the number removed.
    pub fn clear_all(&self) -> usize {
        let store = self.load();
        let removed = store.len();
        self.persist(&Store::new());
        removed
    }

    /// Drop every entry of one verdict class.
    pub fn clear_decision(&self, decision: CachedDecision) -> usize {
        let mut store = self.load();
        let before = store.len();
        store.retain(|_, entry| entry.decision != decision);
        let removed = before - store.len();
        self.persist(&store);
        removed
    }

    /// Drop a single entry by fingerprint.
    pub fn clear_key(&self, fingerprint: &str) -> bool {
        let mut store = self.load();
        let removed = store.remove(fingerprint).is_some();
        if removed {
            self.persist(&store);
        }
        removed
    }

    /// Drop entries whose reason, tool name, or serialized input contains
    /// the given text.
    pub fn clear_matching(&self, needle: &str) -> usize {
        let mut store = self.load();
        let before = store.len();
        store.retain(|_, entry| {
            !(entry.reason.contains(needle)
                || entry.tool_name.contains(needle)
                || entry.tool_input.to_string().contains(needle))
        });
        let removed = before - store.len();
        self.persist(&store);
        removed
    }

    /// Unexpired entries, for administrative inspection.
    pub fn live_entries(&self) -> Vec<(String, CacheEntry)> {
        self.load()
            .into_iter()
            .filter(|(_, entry)| !self.expired(entry))
            .collect()
    }

    fn expired(&self, entry: &CacheEntry) -> bool {
        unix_now().saturating_sub(entry.created_at) > self.settings.ttl.as_secs()
    }

    /// Load the whole store. A missing, unreadable, or corrupted file reads
    /// as an empty store, never an error; the arbiter is authoritative.
    fn load(&self) -> Store {
        let raw = match std::fs::read_to_string(&self.settings.path) {
            Ok(raw) => raw,
            Err(_) => return Store::new(),
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(
                path = %self.settings.path.display(),
                error = %e,
                "cache store unreadable, treating as empty"
            );
            Store::new()
        })
    }

    fn persist(&self, store: &Store) {
        if let Some(parent) = self.settings.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(store) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.settings.path, json) {
                    tracing::warn!(
                        path = %self.settings.path.display(),
                        error = %e,
                        "failed to rewrite cache store"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize cache store"),
        }
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
