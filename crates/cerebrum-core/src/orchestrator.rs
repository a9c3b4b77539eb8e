//! C13 — Orchestrator. Ticks the pipeline, wires
//! signals → C1 → C2 → C3/C4 → C5 → C6 → C7 → C8 → C9/C12, emits events.
//!
//! Concurrency model (§5): the pipeline thread owns C1–C8's in-memory
//! state exclusively; `Orchestrator` is an `Arc`-clonable handle safe to
//! call from multiple producer threads, matching the teacher's handle
//! pattern for its storage layer. Capsule ingest and chat requests are
//! served synchronously against the store, which is internally
//! synchronized (§4.11), so they don't need to cross onto the pipeline
//! thread themselves.

use crate::action::Action;
use crate::audit::{AuditLog, AuditRecord};
use crate::autoencoder::Autoencoder;
use crate::compose::Composer;
use crate::config::Config;
use crate::events::CoreEvent;
use crate::goals::GoalArbiter;
use crate::ingest::{self, IngestConfig, IngestReport};
use crate::ingest::crypto::PeerRegistry;
use crate::insights::{InsightInputs, InsightsEngine};
use crate::intent::IntentClassifier;
use crate::planner::Planner;
use crate::prediction::PredictionEngine;
use crate::qlearning::{state_key, QTable};
use crate::signals::{AtomicSignal, SignalBuffer};
use crate::state::StateInferrer;
use crate::store::Store;
use crate::llm::LlmAdapter;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use uuid::Uuid;

const SIGNAL_QUEUE_CAPACITY: usize = 2048;
const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);
const RMSE_ANOMALY_THRESHOLD: f32 = 0.1;

struct PendingChat {
    state_key: String,
    action: Action,
}

/// All state exclusively owned by the pipeline thread (§5's
/// "single cooperative loop"). Held behind a `Mutex` only so the
/// `Orchestrator` handle can also serve synchronous chat/feedback calls
/// between ticks without a second copy of this state.
struct PipelineState {
    signal_buffer: SignalBuffer,
    autoencoder: Autoencoder,
    classifier: IntentClassifier,
    state_inferrer: StateInferrer,
    prediction: PredictionEngine,
    insights: InsightsEngine,
    goals: GoalArbiter,
    planner: Planner,
    q_table: QTable,
    prev_intent: crate::intent::Intent,
    pending_chats: HashMap<Uuid, PendingChat>,
    signature_failure_observed: bool,
    stego_detected_observed: bool,
}

impl PipelineState {
    fn new() -> Self {
        Self {
            signal_buffer: SignalBuffer::new(),
            autoencoder: Autoencoder::new(),
            classifier: IntentClassifier::new(),
            state_inferrer: StateInferrer::new(),
            prediction: PredictionEngine::new(),
            insights: InsightsEngine::new(),
            goals: GoalArbiter::new(),
            planner: Planner::new(),
            q_table: QTable::new(),
            prev_intent: crate::intent::Intent::Idle,
            pending_chats: HashMap::new(),
            signature_failure_observed: false,
            stego_detected_observed: false,
        }
    }
}

pub struct Orchestrator {
    state: Mutex<PipelineState>,
    store: Arc<Store>,
    config: Config,
    llm: Arc<dyn LlmAdapter>,
    registry: RwLock<PeerRegistry>,
    ingest_config: RwLock<IngestConfig>,
    audit_log: AuditLog,
    signal_tx: SyncSender<AtomicSignal>,
    signal_rx: Mutex<Receiver<AtomicSignal>>,
    dropped_signals: std::sync::atomic::AtomicU64,
    event_txs: Mutex<Vec<Sender<CoreEvent>>>,
    shutdown: std::sync::atomic::AtomicBool,
}

impl Orchestrator {
    pub fn new(config: Config, store: Arc<Store>, llm: Arc<dyn LlmAdapter>) -> Arc<Self> {
        let (signal_tx, signal_rx) = mpsc::sync_channel(SIGNAL_QUEUE_CAPACITY);
        let audit_log = AuditLog::new(&config.audit_log_path());
        Arc::new(Self {
            state: Mutex::new(PipelineState::new()),
            store,
            config,
            llm,
            registry: RwLock::new(PeerRegistry::new()),
            ingest_config: RwLock::new(IngestConfig::default()),
            audit_log,
            signal_tx,
            signal_rx: Mutex::new(signal_rx),
            dropped_signals: std::sync::atomic::AtomicU64::new(0),
            event_txs: Mutex::new(Vec::new()),
            shutdown: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        let (tx, rx) = mpsc::channel();
        self.event_txs.lock().expect("event_txs lock poisoned").push(tx);
        rx
    }

    fn emit(&self, event: CoreEvent) {
        let mut txs = self.event_txs.lock().expect("event_txs lock poisoned");
        txs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn register_peer(&self, sender_id: &str, verifying_key: ed25519_dalek::VerifyingKey, symmetric_key: [u8; 32]) {
        self.registry.write().expect("registry lock poisoned").register(sender_id, verifying_key, symmetric_key);
    }

    pub fn allow_corroboration_source(&self, source: &str) {
        self.ingest_config
            .write()
            .expect("ingest config lock poisoned")
            .corroboration_source_allowlist
            .insert(source.to_string());
    }

    /// Non-blocking; drop-oldest policy on overflow (the sync_channel's
    /// bound itself provides backpressure toward the producer via
    /// `try_send` returning `Full` rather than blocking the caller).
    pub fn push_signal(&self, signal: AtomicSignal) {
        if self.signal_tx.try_send(signal).is_err() {
            self.dropped_signals.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    pub fn dropped_signal_count(&self) -> u64 {
        self.dropped_signals.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Drives one iteration of the pipeline: drains queued signals into
    /// C1, and if a rebuild occurred, drives C2–C7 and C9's state-key
    /// bookkeeping, now-`request_id`-agnostic (chat requests are served
    /// by `submit_user_text`, not by `tick`).
    pub fn tick(&self, now_us: u64) {
        let mut state = self.state.lock().expect("pipeline state lock poisoned");
        let rx = self.signal_rx.lock().expect("signal_rx lock poisoned");
        loop {
            match rx.try_recv() {
                Ok(signal) => {
                    if let Err(e) = state.signal_buffer.add_signal(signal) {
                        tracing::warn!(error = %e, "signal buffer rejected signal");
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        drop(rx);

        if !state.signal_buffer.should_rebuild(now_us) {
            return;
        }

        let sequence = state.signal_buffer.rebuild(now_us).clone();
        if sequence.stat_features == [0.0; crate::signals::STAT_FEATURE_LEN] && state.signal_buffer.is_empty() {
            return;
        }

        let rmse = match state.autoencoder.adjust_weights_on_error(&sequence.stat_features, 0.05) {
            Ok(rmse) => rmse,
            Err(e) => {
                tracing::error!(error = %e, "autoencoder adjustment failed");
                return;
            }
        };
        let latent = match state.autoencoder.encode(&sequence.stat_features) {
            Ok(latent) => latent,
            Err(e) => {
                tracing::error!(error = %e, "autoencoder encode failed");
                return;
            }
        };
        state.signal_buffer.set_latent(latent);
        let sequence = state.signal_buffer.current_sequence().clone();

        let intent = state.classifier.analyze(&sequence);
        let abstract_state = state.state_inferrer.infer(intent, &sequence);
        state.prediction.update(state.prev_intent, intent, &sequence, now_us);
        let prediction_score = state.prediction.query_intent_probability(intent, intent).max(0.0);

        let insight_inputs = InsightInputs {
            classifier_confidence: 1.0,
            classifier_confidence_threshold: 0.1,
            autoencoder_rmse: rmse,
            prediction_top_score: prediction_score,
            battery_pct: sequence.battery_pct,
            battery_charging: sequence.battery_charging,
            signature_failure_observed: state.signature_failure_observed,
            stego_detected_observed: state.stego_detected_observed,
        };
        state.signature_failure_observed = false;
        state.stego_detected_observed = false;
        let insights = state.insights.evaluate(&insight_inputs);

        if let Some(goal) = state.goals.arbitrate(&insights, abstract_state, sequence.battery_pct, sequence.battery_charging) {
            self.emit(CoreEvent::GoalChanged { goal });
        }
        let goal = state.goals.active_goal();

        let _plan = state.planner.create_plan(intent, abstract_state, goal, &sequence);

        for insight in &insights {
            self.emit(CoreEvent::LearningUpdate {
                metric: format!("{:?}", insight.kind),
                value: insight.urgency as f64,
            });
        }

        state.prev_intent = intent;
    }

    /// Embeds the query text, composes a grounded reply, and records the
    /// (state_key, action) pair so `submit_feedback` can apply a reward.
    pub fn submit_user_text(self: &Arc<Self>, text: &str) -> Uuid {
        let request_id = Uuid::new_v4();
        let embed_result = self.llm.embed(text);
        let mut embedding = match embed_result {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "llm embed failed, using zero vector fallback");
                vec![0.0f32; crate::capsule::EMBEDDING_DIM]
            }
        };
        crate::capsule::l2_normalize(&mut embedding);
        self.emit(CoreEvent::EmbeddingReady {
            request_id,
            embedding: embedding.clone(),
        });

        let (intent, abstract_state, goal, latent) = {
            let state = self.state.lock().expect("pipeline state lock poisoned");
            let sequence = state.signal_buffer.current_sequence();
            (state.prev_intent, state.state_inferrer.infer(state.prev_intent, sequence), state.goals.active_goal(), sequence.latent)
        };

        let composer = Composer::new();
        let response = match composer.generate(intent, abstract_state, goal, text, &embedding, &self.store) {
            Ok((response, _contract)) => response,
            Err(e) => {
                tracing::error!(error = %e, "composer failed, returning conservative fallback");
                crate::compose::ChatResponse {
                    text: "I'm temporarily unable to access the knowledge base.".into(),
                    reasoning: "store error".into(),
                    suggested_questions: None,
                    needs_clarification: true,
                }
            }
        };

        {
            let mut state = self.state.lock().expect("pipeline state lock poisoned");
            let key = state_key(intent, abstract_state, &latent);
            let action = state.q_table.choose(&key, true);
            state.pending_chats.insert(request_id, PendingChat { state_key: key, action });
        }

        self.emit(CoreEvent::ResponseReady { request_id, response });
        request_id
    }

    /// Applies a C9 reward using the last (state, action) pair
    /// associated with `request_id`; unknown ids are a no-op.
    pub fn submit_feedback(&self, request_id: Uuid, positive: bool) {
        let reward = if positive { 1.0 } else { -1.0 };
        let mut state = self.state.lock().expect("pipeline state lock poisoned");
        if let Some(pending) = state.pending_chats.remove(&request_id) {
            let key = pending.state_key.clone();
            state.q_table.update(&pending.state_key, pending.action, reward, &key);
            self.emit(CoreEvent::QTableUpdated { state_key: pending.state_key });
        }
    }

    /// Runs the full §4.10 ingest pipeline and audit-logs the outcome.
    pub fn ingest_envelope(&self, envelope_json: &str, sender_id: &str) -> IngestReport {
        let registry = self.registry.read().expect("registry lock poisoned");
        let ingest_config = self.ingest_config.read().expect("ingest config lock poisoned");
        let report = ingest::ingest(&self.store, &registry, &ingest_config, envelope_json, sender_id, &HashMap::new());

        let record = AuditRecord::new(report.capsule_id.clone(), sender_id, &report.result, envelope_json.as_bytes());
        if let Err(e) = self.audit_log.append(&record) {
            tracing::error!(error = %e, "failed to append audit log entry");
        }

        if matches!(report.result, crate::ingest::IngestResult::InvalidSignature) {
            self.state.lock().expect("pipeline state lock poisoned").signature_failure_observed = true;
        }
        if matches!(report.result, crate::ingest::IngestResult::SteganographyDetected) {
            self.state.lock().expect("pipeline state lock poisoned").stego_detected_observed = true;
        }

        if let Some(id) = &report.capsule_id {
            if report.result == crate::ingest::IngestResult::Success {
                self.emit(CoreEvent::KnowledgeBaseUpdated { capsule_id: id.clone() });
            }
        }
        self.emit(CoreEvent::IngestCompleted { report: report.clone() });
        report
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Persists the Q-table's durable mirror into the store's sub-store
    /// and flushes the ANN snapshot; called by the autosave timer and on
    /// graceful shutdown (§5).
    pub fn flush(&self) -> Result<(), crate::store::StoreError> {
        let state = self.state.lock().expect("pipeline state lock poisoned");
        for (key, entry) in state.q_table.entries() {
            let blob = serde_json::to_string(entry).unwrap_or_default();
            self.store.put_q(key, &blob)?;
        }
        drop(state);
        self.store.snapshot_ann()
    }

    /// Loads the Q-table's durable mirror back into memory on startup.
    pub fn load_q_table(&self) -> Result<(), crate::store::StoreError> {
        let keys = self.store.iterate_q_keys()?;
        let mut state = self.state.lock().expect("pipeline state lock poisoned");
        for key in keys {
            if let Some(blob) = self.store.get_q(&key)? {
                if let Ok(entry) = serde_json::from_str(&blob) {
                    state.q_table.load_entry(key, entry);
                }
            }
        }
        Ok(())
    }

    /// Spawns the background pipeline thread and the autosave timer
    /// thread (§5); returns their join handles so a caller (typically
    /// `cerebrum-cli run`) can await them on shutdown.
    pub fn spawn_background_threads(self: &Arc<Self>) -> (std::thread::JoinHandle<()>, std::thread::JoinHandle<()>) {
        let pipeline_handle = self.clone();
        let pipeline_thread = std::thread::spawn(move || {
            let mut now_us: u64 = 0;
            while !pipeline_handle.is_shutting_down() {
                pipeline_handle.tick(now_us);
                std::thread::sleep(DEFAULT_TICK_INTERVAL);
                now_us += DEFAULT_TICK_INTERVAL.as_micros() as u64;
            }
        });

        let autosave_handle = self.clone();
        let autosave_thread = std::thread::spawn(move || {
            while !autosave_handle.is_shutting_down() {
                std::thread::sleep(DEFAULT_AUTOSAVE_INTERVAL);
                if let Err(e) = autosave_handle.flush() {
                    tracing::error!(error = %e, "autosave flush failed");
                }
            }
        });

        (pipeline_thread, autosave_thread)
    }
}

#[allow(dead_code)]
fn rmse_anomaly_threshold() -> f32 {
    RMSE_ANOMALY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmAdapter;

    fn test_orchestrator() -> (Arc<Orchestrator>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store_dir = dir.path().to_path_buf();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        let orchestrator = Orchestrator::new(config, store, Arc::new(MockLlmAdapter));
        (orchestrator, dir)
    }

    #[test]
    fn tick_with_no_signals_does_not_panic() {
        let (orchestrator, _dir) = test_orchestrator();
        orchestrator.tick(0);
    }

    #[test]
    fn chat_round_trip_emits_response_ready() {
        let (orchestrator, _dir) = test_orchestrator();
        let rx = orchestrator.subscribe();
        let request_id = orchestrator.submit_user_text("What is Cerebrum Lux?");
        orchestrator.submit_feedback(request_id, true);

        let mut saw_response = false;
        while let Ok(event) = rx.try_recv() {
            if let CoreEvent::ResponseReady { request_id: rid, .. } = event {
                if rid == request_id {
                    saw_response = true;
                }
            }
        }
        assert!(saw_response);
    }

    #[test]
    fn overflowing_signal_queue_increments_dropped_counter() {
        let (orchestrator, _dir) = test_orchestrator();
        for i in 0..(SIGNAL_QUEUE_CAPACITY + 10) {
            orchestrator.push_signal(AtomicSignal {
                timestamp_us: i as u64,
                sensor: crate::signals::Sensor::System,
                payload: crate::signals::SignalPayload::System,
                app_fingerprint: 0,
            });
        }
        assert!(orchestrator.dropped_signal_count() > 0);
    }
}
