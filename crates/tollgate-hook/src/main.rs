use std::io::Read;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt};

use tollgate_core::arbiter::ModelArbiter;
use tollgate_core::cache::{CachedDecision, DecisionCache};
use tollgate_core::engine::{AuditSink, DecisionEngine, NullAuditSink};
use tollgate_core::rules::RuleSet;

mod audit;
mod config;
mod ingest;
mod output;

use config::TollgateConfig;

#[derive(Parser)]
#[command(name = "tollgate", about = "Permission decision engine for agent tool invocations")]
struct Cli {
    /// Path to the config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Read one permission request from stdin and print the decision
    Evaluate,
    /// Administer the decision cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove cached decisions
    Clear {
        /// Only entries with this verdict class
        #[arg(long)]
        decision: Option<DecisionFilter>,
        /// Only the entry with this fingerprint
        #[arg(long)]
        key: Option<String>,
        /// Only entries whose reason, tool, or input contains this text
        #[arg(long, value_name = "TEXT")]
        matching: Option<String>,
    },
    /// List live (unexpired) entries
    Show,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DecisionFilter {
    Allow,
    Deny,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only the structured decision.
    fmt()
        .with_env_filter(EnvFilter::from_env("TOLLGATE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = TollgateConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Evaluate) {
        Command::Evaluate => evaluate(&config).await,
        Command::Cache { action } => administer_cache(&config, action),
    }
}

async fn evaluate(config: &TollgateConfig) -> Result<()> {
    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;

    let ruling = match ingest::parse_request(&raw) {
        Ok(request) => {
            let audit_sink: Box<dyn AuditSink> = if config.audit.enabled {
                Box::new(audit::JsonlAuditSink::new(config.audit_path()))
            } else {
                Box::new(NullAuditSink)
            };
            let engine = DecisionEngine::new(
                RuleSet::compile(&config.policy),
                DecisionCache::new(config.cache_settings()),
                ModelArbiter::new(config.build_judgment_client(), config.arbiter_settings()),
                audit_sink,
            );
            engine.evaluate(&request).await
        }
        // Malformed input: deny without touching any tier.
        Err(denied) => denied,
    };

    if let Some(payload) = output::render_decision(&ruling) {
        println!("{payload}");
    }
    Ok(())
}

fn administer_cache(config: &TollgateConfig, action: CacheAction) -> Result<()> {
    let cache = DecisionCache::new(config.cache_settings());
    match action {
        CacheAction::Clear {
            decision,
            key,
            matching,
        } => {
            let removed = if let Some(key) = key {
                usize::from(cache.clear_key(&key))
            } else if let Some(decision) = decision {
                cache.clear_decision(match decision {
                    DecisionFilter::Allow => CachedDecision::Allow,
                    DecisionFilter::Deny => CachedDecision::Deny,
                })
            } else if let Some(text) = matching {
                cache.clear_matching(&text)
            } else {
                cache.clear_all()
            };
            println!("removed {removed} cached decision(s)");
        }
        CacheAction::Show => {
            for (fingerprint, entry) in cache.live_entries() {
                println!(
                    "{}  {}  {}  {}",
                    fingerprint.get(..12).unwrap_or(&fingerprint),
                    match entry.decision {
                        CachedDecision::Allow => "allow",
                        CachedDecision::Deny => "deny ",
                    },
                    entry.tool_name,
                    entry.reason,
                );
            }
        }
    }
    Ok(())
}
