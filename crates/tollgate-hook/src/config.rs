use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use tollgate_core::arbiter::{
    ArbiterSettings, HttpJudgmentClient, JudgmentClient, StubJudgmentClient,
};
use tollgate_core::cache::CacheSettings;
use tollgate_core::policy_doc::PersistedPolicyDoc;
use tollgate_core::rules::OperatorPolicy;

/// Full operator configuration, loaded once at startup and passed by
/// reference into each component. No global state.
#[derive(Debug, Default, Deserialize)]
pub struct TollgateConfig {
    #[serde(default)]
    pub policy: OperatorPolicy,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub policy_doc: PolicyDocConfig,
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
            path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub trusted_paths: Vec<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            trusted_paths: vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Provider {
    #[default]
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
    #[serde(rename = "stub")]
    Stub,
}

#[derive(Debug, Deserialize)]
pub struct PolicyDocConfig {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default = "default_true")]
    pub auto_update: bool,
}

impl Default for PolicyDocConfig {
    fn default() -> Self {
        Self {
            version: None,
            text: None,
            auto_update: true,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    7 * 24 * 3600
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_tokens() -> u32 {
    512
}

impl TollgateConfig {
    /// Load the config file, or defaults when none exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config at {}", path.display()))
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            enabled: self.cache.enabled,
            ttl: Duration::from_secs(self.cache.ttl_secs),
            path: self.cache.path.clone().unwrap_or_else(default_cache_path),
        }
    }

    pub fn audit_path(&self) -> PathBuf {
        self.audit.path.clone().unwrap_or_else(default_audit_path)
    }

    pub fn arbiter_settings(&self) -> ArbiterSettings {
        let persisted_policy = match (self.policy_doc.version, &self.policy_doc.text) {
            (Some(version), Some(text)) => Some(PersistedPolicyDoc {
                version,
                text: text.clone(),
            }),
            _ => None,
        };
        ArbiterSettings {
            persisted_policy,
            auto_update_policy: self.policy_doc.auto_update,
            max_tokens: self.model.max_tokens,
            trusted_paths: self.model.trusted_paths.clone(),
        }
    }

    pub fn build_judgment_client(&self) -> Box<dyn JudgmentClient> {
        match self.model.provider {
            Provider::OpenAiCompatible => {
                let api_key = std::env::var("TOLLGATE_API_KEY")
                    .ok()
                    .or_else(|| self.model.api_key.clone());
                Box::new(HttpJudgmentClient::new(
                    self.model.base_url.clone(),
                    self.model.model.clone(),
                    api_key,
                ))
            }
            Provider::Stub => Box::new(StubJudgmentClient::constant(
                r#"{"decision": "deny", "reason": "stub judgment"}"#,
            )),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tollgate")
}

fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn default_cache_path() -> PathBuf {
    config_dir().join("decision-cache.json")
}

fn default_audit_path() -> PathBuf {
    config_dir().join("decisions.jsonl")
}
