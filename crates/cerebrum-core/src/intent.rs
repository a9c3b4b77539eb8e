//! C3 — Intent Classifier: template-weight dot product over the latent
//! vector, argmax with a confidence threshold and deterministic tie-break.

use crate::action::Action;
use crate::signals::{DynamicSequence, LATENT_DIM};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.1;
const WEIGHT_CLAMP: f32 = 5.0;
const ACTION_SCORE_CLAMP: f32 = 10.0;

/// Fixed intent vocabulary, keyword groups grounded in
/// `natural_language_processor.cpp`'s `intent_keyword_map` seeding.
/// Declaration order is the tie-break order: on equal scores the
/// earlier-declared (smaller index) variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    Programming,
    Editing,
    Research,
    Communication,
    CreativeWork,
    Gaming,
    MediaConsumption,
    FastTyping,
    Idle,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 10] = [
        Intent::Programming,
        Intent::Editing,
        Intent::Research,
        Intent::Communication,
        Intent::CreativeWork,
        Intent::Gaming,
        Intent::MediaConsumption,
        Intent::FastTyping,
        Intent::Idle,
        Intent::Unknown,
    ];

    fn index(&self) -> usize {
        Intent::ALL.iter().position(|i| i == self).expect("Intent::ALL is exhaustive")
    }
}

impl PartialEq for IntentTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentTemplate {
    pub id: Intent,
    pub weights: [f32; LATENT_DIM],
    pub action_q: HashMap<Action, f32>,
    pub confidence_threshold: f32,
}

impl IntentTemplate {
    pub fn new(id: Intent, weights: [f32; LATENT_DIM]) -> Self {
        Self {
            id,
            weights: clamp_weights(weights),
            action_q: HashMap::new(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn set_action_score(&mut self, action: Action, score: f32) {
        self.action_q.insert(action, score.clamp(-ACTION_SCORE_CLAMP, ACTION_SCORE_CLAMP));
    }
}

fn clamp_weights(w: [f32; LATENT_DIM]) -> [f32; LATENT_DIM] {
    let mut out = [0.0; LATENT_DIM];
    for i in 0..LATENT_DIM {
        out[i] = w[i].clamp(-WEIGHT_CLAMP, WEIGHT_CLAMP);
    }
    out
}

fn dot(a: &[f32; LATENT_DIM], b: &[f32; LATENT_DIM]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub struct IntentClassifier {
    templates: HashMap<Intent, IntentTemplate>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    /// Hand-seeded weights encoding activity/complexity/engagement
    /// semantics for each intent class (§4.3).
    pub fn new() -> Self {
        let seeds: [(Intent, [f32; LATENT_DIM]); 9] = [
            (Intent::Programming, [0.9, 0.85, 0.6]),
            (Intent::Editing, [0.6, 0.9, 0.7]),
            (Intent::Research, [0.4, 0.6, 0.8]),
            (Intent::Communication, [0.3, 0.5, 0.9]),
            (Intent::CreativeWork, [0.7, 0.7, 0.75]),
            (Intent::Gaming, [0.8, 0.3, 0.95]),
            (Intent::MediaConsumption, [0.1, 0.2, 0.9]),
            (Intent::FastTyping, [0.95, 0.4, 0.5]),
            (Intent::Idle, [0.05, 0.05, 0.05]),
        ];
        let mut templates = HashMap::new();
        for (intent, weights) in seeds {
            templates.insert(intent, IntentTemplate::new(intent, weights));
        }
        Self { templates }
    }

    pub fn analyze(&self, sequence: &DynamicSequence) -> Intent {
        let mut best: Option<(Intent, f32)> = None;
        for intent in Intent::ALL.iter().filter(|i| **i != Intent::Unknown) {
            let Some(template) = self.templates.get(intent) else {
                continue;
            };
            let score = dot(&template.weights, &sequence.latent);
            match best {
                None => best = Some((*intent, score)),
                Some((_, best_score)) => {
                    if score > best_score || (score == best_score && intent.index() < best.unwrap().0.index()) {
                        best = Some((*intent, score));
                    }
                }
            }
        }
        match best {
            Some((intent, score)) => {
                let threshold = self
                    .templates
                    .get(&intent)
                    .map(|t| t.confidence_threshold)
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
                if score < threshold {
                    Intent::Unknown
                } else {
                    intent
                }
            }
            None => Intent::Unknown,
        }
    }

    pub fn set_threshold(&mut self, intent: Intent, f: f32) {
        let clamped = f.clamp(0.01, 0.8);
        if let Some(t) = self.templates.get_mut(&intent) {
            t.confidence_threshold = clamped;
        }
    }

    pub fn update_template(&mut self, intent: Intent, new_weights: [f32; LATENT_DIM]) {
        let clamped = clamp_weights(new_weights);
        self.templates
            .entry(intent)
            .and_modify(|t| t.weights = clamped)
            .or_insert_with(|| IntentTemplate::new(intent, clamped));
    }

    pub fn weights_of(&self, intent: Intent) -> Option<[f32; LATENT_DIM]> {
        self.templates.get(&intent).map(|t| t.weights)
    }

    pub fn template_mut(&mut self, intent: Intent) -> &mut IntentTemplate {
        self.templates
            .entry(intent)
            .or_insert_with(|| IntentTemplate::new(intent, [0.0; LATENT_DIM]))
    }
}
