//! C5 — Prediction Engine: directed graph of (intent→intent) edges
//! weighted by observed-transition probability and latent-delta
//! similarity, used to predict the next intent.

use crate::intent::{Intent, IntentClassifier};
use crate::signals::{DynamicSequence, LATENT_DIM};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

const COMBINED_SCORE_FALLBACK_THRESHOLD: f32 = 0.25;
const TRANSITION_WEIGHT: f32 = 0.7;
const SIMILARITY_WEIGHT: f32 = 0.3;
const SIMILARITY_DECAY: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEdge {
    pub from: Intent,
    pub to: Intent,
    pub observation_count: u32,
    pub transition_probability: f32,
    pub latent_delta_mean: [f32; LATENT_DIM],
    pub last_observed_us: u64,
}

pub struct PredictionEngine {
    edges: HashMap<(Intent, Intent), TransitionEdge>,
}

impl Default for PredictionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionEngine {
    pub fn new() -> Self {
        Self { edges: HashMap::new() }
    }

    /// Locates or creates edge `(prev, cur)`, updates its running-mean
    /// latent delta and observation count, then renormalizes every
    /// outgoing edge from `prev`.
    pub fn update(&mut self, prev_intent: Intent, cur_intent: Intent, sequence: &DynamicSequence, now_us: u64) {
        let key = (prev_intent, cur_intent);
        let entry = self.edges.entry(key).or_insert_with(|| TransitionEdge {
            from: prev_intent,
            to: cur_intent,
            observation_count: 0,
            transition_probability: 0.0,
            latent_delta_mean: [0.0; LATENT_DIM],
            last_observed_us: now_us,
        });

        let n = entry.observation_count as f32;
        for i in 0..LATENT_DIM {
            entry.latent_delta_mean[i] = (entry.latent_delta_mean[i] * n + sequence.latent[i]) / (n + 1.0);
        }
        entry.observation_count += 1;
        entry.last_observed_us = now_us;

        let total: u32 = self
            .edges
            .values()
            .filter(|e| e.from == prev_intent)
            .map(|e| e.observation_count)
            .sum();
        for edge in self.edges.values_mut().filter(|e| e.from == prev_intent) {
            edge.transition_probability = edge.observation_count as f32 / total as f32;
        }
    }

    pub fn edges_from(&self, intent: Intent) -> impl Iterator<Item = &TransitionEdge> {
        self.edges.values().filter(move |e| e.from == intent)
    }

    fn combined_score(edge: &TransitionEdge, sequence: &DynamicSequence) -> f32 {
        let dist = euclidean(&sequence.latent, &edge.latent_delta_mean);
        TRANSITION_WEIGHT * edge.transition_probability + SIMILARITY_WEIGHT * (-dist / SIMILARITY_DECAY).exp()
    }

    /// Predicts the next intent from `cur_intent`'s outgoing edges; falls
    /// back to the classifier's direct analysis if the best combined
    /// score is below threshold (or there are no outgoing edges).
    pub fn predict_next(&self, cur_intent: Intent, sequence: &DynamicSequence, classifier: &IntentClassifier) -> Intent {
        let best = self
            .edges_from(cur_intent)
            .map(|e| (e.to, Self::combined_score(e, sequence)))
            .fold(None::<(Intent, f32)>, |acc, (intent, score)| match acc {
                None => Some((intent, score)),
                Some((_, best_score)) if score > best_score => Some((intent, score)),
                other => other,
            });

        match best {
            Some((intent, score)) if score >= COMBINED_SCORE_FALLBACK_THRESHOLD => intent,
            _ => classifier.analyze(sequence),
        }
    }

    pub fn query_intent_probability(&self, from: Intent, target: Intent) -> f32 {
        self.edges.get(&(from, target)).map(|e| e.transition_probability).unwrap_or(0.0)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let mut f = std::fs::File::create(path)?;
        writeln!(f, "# from to count probability mean_dx mean_dy mean_dz last_seen_us")?;
        for edge in self.edges.values() {
            writeln!(
                f,
                "{:?} {:?} {} {} {} {} {} {}",
                edge.from,
                edge.to,
                edge.observation_count,
                edge.transition_probability,
                edge.latent_delta_mean[0],
                edge.latent_delta_mean[1],
                edge.latent_delta_mean[2],
                edge.last_observed_us
            )?;
        }
        Ok(())
    }

    /// Loads the graph from its flat text format; malformed lines are
    /// skipped with a warning, never fatal to the whole load.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let f = std::fs::File::open(path)?;
        let reader = BufReader::new(f);
        let mut engine = Self::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match parse_edge_line(trimmed) {
                Some(edge) => {
                    engine.edges.insert((edge.from, edge.to), edge);
                }
                None => {
                    tracing::warn!(line = lineno, content = trimmed, "skipping malformed intent graph line");
                }
            }
        }
        Ok(engine)
    }
}

fn parse_edge_line(line: &str) -> Option<TransitionEdge> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 8 {
        return None;
    }
    let from = parse_intent(parts[0])?;
    let to = parse_intent(parts[1])?;
    let observation_count: u32 = parts[2].parse().ok()?;
    let transition_probability: f32 = parts[3].parse().ok()?;
    let dx: f32 = parts[4].parse().ok()?;
    let dy: f32 = parts[5].parse().ok()?;
    let dz: f32 = parts[6].parse().ok()?;
    let last_observed_us: u64 = parts[7].parse().ok()?;
    Some(TransitionEdge {
        from,
        to,
        observation_count,
        transition_probability,
        latent_delta_mean: [dx, dy, dz],
        last_observed_us,
    })
}

fn parse_intent(s: &str) -> Option<Intent> {
    Intent::ALL.into_iter().find(|i| format!("{:?}", i) == s)
}

fn euclidean(a: &[f32; LATENT_DIM], b: &[f32; LATENT_DIM]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}
