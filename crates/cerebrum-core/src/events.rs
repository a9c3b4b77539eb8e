//! Outbound event bus (§6): `{response_ready, learning_update,
//! knowledge_base_updated, q_table_updated}` for UI consumers, plus
//! `embedding_ready` for the chat request lifecycle. Broadcast over a
//! `std::sync::mpsc` channel — "UI consumers" are any receiver.

use crate::compose::ChatResponse;
use crate::goals::Goal;
use crate::ingest::IngestReport;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum CoreEvent {
    EmbeddingReady { request_id: Uuid, embedding: Vec<f32> },
    ResponseReady { request_id: Uuid, response: ChatResponse },
    LearningUpdate { metric: String, value: f64 },
    GoalChanged { goal: Goal },
    KnowledgeBaseUpdated { capsule_id: String },
    QTableUpdated { state_key: String },
    IngestCompleted { report: IngestReport },
}
