//! C9 — Sparse Q-Table Learner. State keys are a canonical string
//! encoding of `(intent, abstract_state, quantized_latent)`; the table
//! itself lives entirely in memory and is mirrored durably through
//! C11's dedicated sub-store (see `store::kv`).

use crate::action::Action;
use crate::intent::Intent;
use crate::signals::LATENT_DIM;
use crate::state::AbstractState;
use rand::Rng;
use std::collections::HashMap;

const DEFAULT_ALPHA: f32 = 0.1;
const DEFAULT_GAMMA: f32 = 0.9;
const DEFAULT_EPSILON: f32 = 0.1;

pub type StateKey = String;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SparseQEntry {
    pub action_values: HashMap<Action, f32>,
}

/// Canonical deterministic UTF-8 key: latent components rounded to 2
/// decimal places so near-identical sequences collapse onto the same
/// sparse entry.
pub fn state_key(intent: Intent, state: AbstractState, latent: &[f32; LATENT_DIM]) -> StateKey {
    let quantized: Vec<String> = latent.iter().map(|x| format!("{:.2}", x)).collect();
    format!("{:?}|{:?}|{}", intent, state, quantized.join(","))
}

pub struct QTable {
    entries: HashMap<StateKey, SparseQEntry>,
    alpha: f32,
    gamma: f32,
    epsilon: f32,
}

impl Default for QTable {
    fn default() -> Self {
        Self::new()
    }
}

impl QTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            alpha: DEFAULT_ALPHA,
            gamma: DEFAULT_GAMMA,
            epsilon: DEFAULT_EPSILON,
        }
    }

    pub fn q(&self, state_key: &str, action: Action) -> f32 {
        self.entries
            .get(state_key)
            .and_then(|e| e.action_values.get(&action))
            .copied()
            .unwrap_or(0.0)
    }

    fn max_q(&self, state_key: &str) -> f32 {
        self.entries
            .get(state_key)
            .map(|e| e.action_values.values().cloned().fold(0.0f32, f32::max))
            .unwrap_or(0.0)
    }

    /// `Q(s,a) <- Q(s,a) + alpha * (r + gamma * max_a' Q(s_next, a') - Q(s,a))`
    pub fn update(&mut self, state_prev: &str, action: Action, reward: f32, state_next: &str) {
        let current = self.q(state_prev, action);
        let target = reward + self.gamma * self.max_q(state_next);
        let updated = current + self.alpha * (target - current);
        self.entries
            .entry(state_prev.to_string())
            .or_default()
            .action_values
            .insert(action, updated);
    }

    /// ε-greedy action selection; argmax otherwise. Ties break to the
    /// smaller action index.
    pub fn choose(&self, state_key: &str, explore: bool) -> Action {
        if explore && rand::thread_rng().gen::<f32>() < self.epsilon {
            let idx = rand::thread_rng().gen_range(0..Action::ALL.len());
            return Action::ALL[idx];
        }
        let Some(entry) = self.entries.get(state_key) else {
            return Action::NoOp;
        };
        Action::ALL
            .iter()
            .copied()
            .fold(None::<(Action, f32)>, |acc, action| {
                let v = entry.action_values.get(&action).copied().unwrap_or(0.0);
                match acc {
                    None => Some((action, v)),
                    Some((_, best)) if v > best => Some((action, v)),
                    other => other,
                }
            })
            .map(|(a, _)| a)
            .unwrap_or(Action::NoOp)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&StateKey, &SparseQEntry)> {
        self.entries.iter()
    }

    pub fn load_entry(&mut self, key: StateKey, entry: SparseQEntry) {
        self.entries.insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
