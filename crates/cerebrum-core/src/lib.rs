//! # Cerebrum Core
//!
//! Cognition pipeline and backing storage engine for a personal,
//! privacy-preserving cognitive assistant. Observes low-level signals,
//! infers the user's intent and abstract state, plans corrective or
//! supportive actions, and grounds natural-language replies in a
//! persistent, cryptographically-verified knowledge base.
//!
//! ## Pipeline
//!
//! - [`signals`]: ring buffer of [`signals::AtomicSignal`]s and the
//!   windowed [`signals::DynamicSequence`] it periodically emits (C1).
//! - [`autoencoder`]: dense 18→3 encoder/decoder with online
//!   error-driven weight nudges (C2).
//! - [`intent`]: template-weight dot product over the latent vector (C3).
//! - [`state`]: weighted rule scorer over metrics and latent vector (C4).
//! - [`prediction`]: directed intent transition graph (C5).
//! - [`insights`]: anomaly / opportunity / drift insights with urgency (C6).
//! - [`goals`]: single active goal from a monotone-preference policy (C7).
//! - [`planner`]: ordered action plan per (intent, state, goal) (C8).
//! - [`qlearning`]: sparse Q-table keyed by embedding-derived state (C9).
//! - [`ingest`]: capsule ingest pipeline — verify, decrypt, schema,
//!   sanitize, steganalysis, corroborate (C10).
//! - [`store`]: durable key/value map of capsules plus an ANN index (C11).
//! - [`compose`]: grounded-reply composer and LLM prompt contract (C12).
//! - [`orchestrator`]: ticks the pipeline end to end (C13).
//!
//! ## Ambient
//!
//! - [`config`]: environment-driven configuration (`CL_*` variables).
//! - [`error`]: aggregate error taxonomy for the orchestrator boundary.
//! - [`events`]: outbound event bus for UI consumers.
//! - [`audit`]: append-only ingest audit log.
//! - [`action`]: shared action vocabulary referenced across C3/C6/C8/C9.
//! - [`llm`]: external LLM/embedding adapter contract (§6).

pub mod action;
pub mod audit;
pub mod autoencoder;
pub mod capsule;
pub mod compose;
pub mod config;
pub mod error;
pub mod events;
pub mod goals;
pub mod ingest;
pub mod insights;
pub mod intent;
pub mod llm;
pub mod orchestrator;
pub mod planner;
pub mod prediction;
pub mod qlearning;
pub mod signals;
pub mod state;
pub mod store;

pub use action::Action;
pub use autoencoder::Autoencoder;
pub use capsule::{Capsule, CapsuleEnvelope};
pub use compose::{ChatResponse, Composer, PromptContract};
pub use config::Config;
pub use error::{CoreError, Result};
pub use events::CoreEvent;
pub use goals::{Goal, GoalArbiter};
pub use ingest::{IngestConfig, IngestReport, IngestResult};
pub use insights::{Insight, InsightKind, InsightsEngine};
pub use intent::{Intent, IntentClassifier, IntentTemplate};
pub use llm::{LlmAdapter, MockLlmAdapter};
pub use orchestrator::Orchestrator;
pub use planner::{ActionPlanStep, Plan, Planner};
pub use prediction::{PredictionEngine, TransitionEdge};
pub use qlearning::{state_key, QTable, SparseQEntry, StateKey};
pub use signals::{AtomicSignal, DynamicSequence, Sensor, SignalBuffer};
pub use state::{AbstractState, StateInferrer};
pub use store::Store;

/// Crate version, for diagnostics and the CLI's `--version` surface.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        AbstractState, Action, AtomicSignal, Autoencoder, Capsule, ChatResponse, Config,
        CoreError, CoreEvent, DynamicSequence, Goal, GoalArbiter, Insight, Intent,
        IntentClassifier, LlmAdapter, Orchestrator, Plan, Planner, PredictionEngine, QTable,
        Result, Sensor, SignalBuffer, StateInferrer, Store,
    };
}
