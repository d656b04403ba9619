//! Decision pipeline for agent tool invocations.
//!
//! A request flows through three tiers: deterministic fast-path rules,
//! a content-addressed decision cache, and a model arbiter consulted only
//! when neither cheaper tier decides. Every failure past the fast tier
//! resolves to a deny, never an allow.

pub mod arbiter;
pub mod cache;
pub mod engine;
pub mod error;
pub mod policy_doc;
pub mod request;
pub mod rules;
pub mod verdict;
