//! C6 — Insights Engine: derives anomaly / opportunity / drift insights
//! from C2–C5 outputs with urgency scores.

use crate::action::Action;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsightKind {
    PerformanceAnomaly,
    LearningOpportunity,
    SecurityAlert,
    EfficiencySuggestion,
    ResourceOptimization,
    BehavioralDrift,
    UserContext,
    CodeSuggestion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub urgency: f32,
    pub observation: String,
    pub suggested_action: Action,
}

impl Insight {
    pub fn new(kind: InsightKind, urgency: f32, observation: impl Into<String>, suggested_action: Action) -> Self {
        Self {
            kind,
            urgency: urgency.clamp(0.0, 1.0),
            observation: observation.into(),
            suggested_action,
        }
    }
}

const RMSE_ANOMALY_THRESHOLD: f32 = 0.1;
const RMSE_ANOMALY_STREAK: u32 = 3;
const CONFIDENCE_OPPORTUNITY_STREAK: u32 = 3;
const PREDICTION_DRIFT_THRESHOLD: f32 = 0.25;
const PREDICTION_DRIFT_STREAK: u32 = 3;
const LOW_BATTERY_THRESHOLD: u8 = 20;

/// Tracks consecutive-tick counters so streak-based rules (§4.6) fire
/// only after sustained evidence, not a single noisy tick.
#[derive(Default)]
pub struct InsightsEngine {
    rmse_streak: u32,
    low_confidence_streak: u32,
    drift_streak: u32,
}

pub struct InsightInputs {
    pub classifier_confidence: f32,
    pub classifier_confidence_threshold: f32,
    pub autoencoder_rmse: f32,
    pub prediction_top_score: f32,
    pub battery_pct: u8,
    pub battery_charging: bool,
    pub signature_failure_observed: bool,
    pub stego_detected_observed: bool,
}

impl InsightsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&mut self, inputs: &InsightInputs) -> Vec<Insight> {
        let mut insights = Vec::new();

        if inputs.autoencoder_rmse > RMSE_ANOMALY_THRESHOLD {
            self.rmse_streak += 1;
        } else {
            self.rmse_streak = 0;
        }
        if self.rmse_streak >= RMSE_ANOMALY_STREAK {
            insights.push(Insight::new(
                InsightKind::PerformanceAnomaly,
                inputs.autoencoder_rmse.clamp(0.0, 1.0),
                format!("reconstruction error sustained above threshold for {} ticks", self.rmse_streak),
                Action::SummarizeContext,
            ));
        }

        if inputs.classifier_confidence < inputs.classifier_confidence_threshold {
            self.low_confidence_streak += 1;
        } else {
            self.low_confidence_streak = 0;
        }
        if self.low_confidence_streak >= CONFIDENCE_OPPORTUNITY_STREAK {
            insights.push(Insight::new(
                InsightKind::LearningOpportunity,
                0.5,
                "classifier confidence repeatedly below threshold",
                Action::OfferHelp,
            ));
        }

        if inputs.prediction_top_score < PREDICTION_DRIFT_THRESHOLD {
            self.drift_streak += 1;
        } else {
            self.drift_streak = 0;
        }
        if self.drift_streak >= PREDICTION_DRIFT_STREAK {
            insights.push(Insight::new(
                InsightKind::BehavioralDrift,
                0.6,
                "prediction engine top score sustained below threshold",
                Action::ReorganizeWorkspace,
            ));
        }

        if inputs.battery_pct < LOW_BATTERY_THRESHOLD && !inputs.battery_charging {
            insights.push(Insight::new(
                InsightKind::ResourceOptimization,
                1.0 - inputs.battery_pct as f32 / LOW_BATTERY_THRESHOLD as f32,
                "battery low and not charging",
                Action::EnableBatterySaver,
            ));
        }

        if inputs.signature_failure_observed || inputs.stego_detected_observed {
            insights.push(Insight::new(
                InsightKind::SecurityAlert,
                1.0,
                "ingest pipeline rejected a capsule on integrity grounds",
                Action::FlagSecurityConcern,
            ));
        }

        insights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> InsightInputs {
        InsightInputs {
            classifier_confidence: 1.0,
            classifier_confidence_threshold: 0.1,
            autoencoder_rmse: 0.0,
            prediction_top_score: 1.0,
            battery_pct: 100,
            battery_charging: true,
            signature_failure_observed: false,
            stego_detected_observed: false,
        }
    }

    #[test]
    fn sustained_rmse_triggers_performance_anomaly() {
        let mut engine = InsightsEngine::new();
        let mut inputs = base_inputs();
        inputs.autoencoder_rmse = 0.5;
        let mut last = Vec::new();
        for _ in 0..RMSE_ANOMALY_STREAK {
            last = engine.evaluate(&inputs);
        }
        assert!(last.iter().any(|i| i.kind == InsightKind::PerformanceAnomaly));
    }

    #[test]
    fn security_alert_fires_immediately_on_stego_detection() {
        let mut engine = InsightsEngine::new();
        let mut inputs = base_inputs();
        inputs.stego_detected_observed = true;
        let insights = engine.evaluate(&inputs);
        assert!(insights.iter().any(|i| i.kind == InsightKind::SecurityAlert && i.urgency == 1.0));
    }

    #[test]
    fn low_battery_triggers_resource_optimization() {
        let mut engine = InsightsEngine::new();
        let mut inputs = base_inputs();
        inputs.battery_pct = 10;
        inputs.battery_charging = false;
        let insights = engine.evaluate(&inputs);
        assert!(insights.iter().any(|i| i.kind == InsightKind::ResourceOptimization));
    }
}
