//! C12 — Response Composer: selects/assembles a user-visible reply from
//! a ranked capsule set, the current goal, and a prompt contract for
//! the external LLM.

use crate::capsule::Capsule;
use crate::goals::Goal;
use crate::intent::Intent;
use crate::state::AbstractState;
use crate::store::{Store, StoreError};
use serde::{Deserialize, Serialize};

const TOP_K_RETRIEVE: usize = 5;
const TOP_N_KEEP: usize = 3;
const CLARIFICATION_SIMILARITY_FLOOR: f32 = 0.3;
const RANK_SIMILARITY_WEIGHT: f32 = 0.7;
const RANK_CONFIDENCE_WEIGHT: f32 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub reasoning: String,
    pub suggested_questions: Option<Vec<String>>,
    pub needs_clarification: bool,
}

#[derive(Debug, Clone)]
pub struct PromptContract {
    pub system: String,
    pub context: String,
    pub user: String,
}

pub struct Composer;

impl Default for Composer {
    fn default() -> Self {
        Self
    }
}

impl Composer {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(
        &self,
        intent: Intent,
        state: AbstractState,
        goal: Goal,
        query_text: &str,
        query_embedding: &[f32],
        kb: &Store,
    ) -> Result<(ChatResponse, PromptContract), StoreError> {
        let retrieved = kb.search_knn_scored(query_embedding, TOP_K_RETRIEVE)?;

        let mut ranked: Vec<(Capsule, f32, f32)> = retrieved
            .into_iter()
            .map(|(capsule, similarity)| {
                let rank = RANK_SIMILARITY_WEIGHT * similarity + RANK_CONFIDENCE_WEIGHT * capsule.confidence;
                (capsule, similarity, rank)
            })
            .collect();
        ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(TOP_N_KEEP);

        let best_similarity = ranked.iter().map(|(_, sim, _)| *sim).fold(0.0f32, f32::max);

        if best_similarity < CLARIFICATION_SIMILARITY_FLOOR || ranked.is_empty() {
            let fallback = fallback_text(intent, state);
            let response = ChatResponse {
                text: fallback.clone(),
                reasoning: "no capsule cleared the grounding-similarity floor".into(),
                suggested_questions: None,
                needs_clarification: true,
            };
            let contract = PromptContract {
                system: system_prompt(goal),
                context: String::new(),
                user: query_text.to_string(),
            };
            return Ok((response, contract));
        }

        let scaffold = build_scaffold(&ranked);
        let text = format!(
            "{} {}",
            ranked[0].0.plain_text_summary,
            citation_marker(&ranked[0].0.id)
        );
        let response = ChatResponse {
            text,
            reasoning: format!("grounded in {} capsule(s), top similarity {:.2}", ranked.len(), best_similarity),
            suggested_questions: None,
            needs_clarification: false,
        };
        let contract = PromptContract {
            system: system_prompt(goal),
            context: scaffold,
            user: query_text.to_string(),
        };
        Ok((response, contract))
    }
}

fn citation_marker(capsule_id: &str) -> String {
    format!("[source:{}]", capsule_id)
}

fn build_scaffold(ranked: &[(Capsule, f32, f32)]) -> String {
    ranked
        .iter()
        .map(|(capsule, similarity, _)| {
            format!(
                "- {} ({:.2} similarity) {} {}",
                capsule.topic,
                similarity,
                capsule.plain_text_summary,
                citation_marker(&capsule.id)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn system_prompt(goal: Goal) -> String {
    format!(
        "You are Cerebrum's response composer. Current goal: {:?}. \
         Respond in the user's language. Preserve citation markers verbatim; \
         never fabricate a citation marker for a capsule not present in context.",
        goal
    )
}

fn fallback_text(intent: Intent, state: AbstractState) -> String {
    match (intent, state) {
        (Intent::Research, _) => "I don't have a grounded answer for that yet — could you point me at a source or rephrase?".to_string(),
        (_, AbstractState::Distracted) => "I can help once I have a bit more context — what are you trying to do?".to_string(),
        _ => "I don't have enough grounded knowledge to answer that confidently yet.".to_string(),
    }
}
