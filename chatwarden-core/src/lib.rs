// chatwarden-core/src/lib.rs
//! # ChatWarden Core Library
//!
//! `chatwarden-core` enforces a content policy in a persistent group-chat
//! community: it detects prohibited language even when deliberately
//! obfuscated, accumulates weighted strikes per user, and automatically
//! escalates to timed communication restrictions and eventually bans, while
//! durably tracking strike and mute history through the pluggable blob
//! persistence in `chatwarden-store`.
//!
//! The library is platform-independent: everything the host chat platform
//! must provide — punishment actions, private notifications, the audit
//! channel, the durable medium itself — sits behind a trait.
//!
//! ## Modules
//!
//! * `normalize`: Canonicalizes raw text (confusable folding, diacritic
//!   stripping, separator collapsing) before matching.
//! * `terms`: The tiered forbidden-term list and the one pure decoder for
//!   its source-hiding transform.
//! * `compiler`: Expands terms into homoglyph character classes and compiles
//!   one combined matcher per tier, once, behind a process-wide cache.
//! * `censor`: Applies the compiled matchers, producing a redaction plus a
//!   weighted strike score.
//! * `records` / `ledger`: Durable, append-only per-user strike and mute
//!   histories with lazy expiry, mutated through atomic collection updates.
//! * `escalation`: Decides no-op / timeout / ban from a verdict plus ledger
//!   state and drives the audit trail.
//! * `policy`: The static escalation configuration.
//! * `gateway` / `audit`: Collaborator traits supplied by the host.
//! * `engine`: One owned object assembling the whole pipeline.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use chatwarden_core::{
//!     AuditEntry, AuditSink, GatewayError, ModerationEngine, ModerationPolicy,
//!     PunishmentGateway, TermList,
//! };
//! use chatwarden_store::FileBlobStore;
//!
//! struct NoopGateway;
//!
//! #[async_trait]
//! impl PunishmentGateway for NoopGateway {
//!     async fn timeout(&self, _: &str, _: chrono::Duration, _: &str) -> Result<(), GatewayError> { Ok(()) }
//!     async fn ban(&self, _: &str, _: &str) -> Result<(), GatewayError> { Ok(()) }
//!     async fn direct_message(&self, _: &str, _: &str) -> Result<(), GatewayError> { Ok(()) }
//! }
//!
//! struct LogSink;
//!
//! #[async_trait]
//! impl AuditSink for LogSink {
//!     async fn append(&self, entry: &AuditEntry) -> Result<()> {
//!         log::info!("{}", entry.to_json());
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let engine = ModerationEngine::new(
//!         ModerationPolicy::default(),
//!         &TermList::load_default()?,
//!         Arc::new(FileBlobStore::new("./warden-data")),
//!         Arc::new(NoopGateway),
//!         Arc::new(LogSink),
//!     )?;
//!
//!     if let Some((verdict, action)) = engine
//!         .handle_message("170915625722576896", "you piece of sh1t", "msg/42")
//!         .await?
//!     {
//!         println!("redacted: {}", verdict.redacted_text);
//!         println!("action: {action:?}");
//!     }
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Fallible operations return [`WardenError`] (or `anyhow::Error` at
//! orchestration seams). Two failures deliberately do not propagate:
//! over-removal on unwarn is clamped and reported in the
//! [`WarnOutcome`](ledger::WarnOutcome), and platform permission refusals
//! are logged at alert severity by the escalation controller.
//!
//! ## Design Principles
//!
//! * **Compile once:** tier matchers are built at startup and shared; the
//!   hot path never recompiles.
//! * **Stateless matching:** concurrent evaluations share immutable
//!   matchers; nothing carries a cursor between calls.
//! * **Cache-authoritative persistence:** ledgers mutate whole collections
//!   as atomic transforms through the debounced record store, never by
//!   editing blobs in place.
//!
//! ---
//! License: MIT OR Apache-2.0

pub mod audit;
pub mod censor;
pub mod compiler;
pub mod engine;
pub mod errors;
pub mod escalation;
pub mod gateway;
pub mod ledger;
pub mod normalize;
pub mod policy;
pub mod records;
pub mod terms;
pub mod verdict;

/// Re-exports the custom error type for clear error reporting.
pub use errors::WardenError;

/// Re-exports the normalizer entry point.
pub use normalize::normalize;

/// Re-exports the forbidden-term list types and the cipher decoder.
pub use terms::{decode_rot13, ForbiddenTerm, TermList, TermTier, MAX_PATTERN_LENGTH};

/// Re-exports the compiled-matcher types for advanced usage.
pub use compiler::{compile_terms, get_or_compile, CompiledPolicy, CompiledTier};

/// Re-exports the censor engine and its verdict types.
pub use censor::{CensorEngine, CensorOptions};
pub use verdict::{CensorVerdict, MatchedSpan};

/// Re-exports the escalation configuration.
pub use policy::ModerationPolicy;

/// Re-exports the persisted record types and ledgers.
pub use ledger::{MuteLedger, StrikeLedger, WarnOutcome, MUTES_COLLECTION, STRIKES_COLLECTION};
pub use records::{MuteRecord, StrikeRecord};

/// Re-exports the escalation controller and its action type.
pub use escalation::{Action, EscalationController, EvaluationContext};

/// Re-exports the collaborator traits the host platform implements.
pub use audit::{AuditCategory, AuditEntry, AuditSink};
pub use gateway::{GatewayError, PunishmentGateway};

/// Re-exports the assembled engine.
pub use engine::ModerationEngine;
