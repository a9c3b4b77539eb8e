//! C4 — Abstract-State Inferrer: weighted rule scorer over normalized
//! metrics and the latent vector, producing one of a fixed state set.

use crate::intent::Intent;
use crate::signals::DynamicSequence;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbstractState {
    Idle,
    HighProductivity,
    LowProductivity,
    Focused,
    Distracted,
    PowerSaving,
    CreativeFlow,
    Debugging,
    PassiveConsumption,
    HardwareAnomaly,
    SeekingInformation,
    SocialInteraction,
    NormalOperation,
}

const BASELINE_NORMAL_OPERATION: f32 = 0.5;

pub struct StateInferrer;

impl Default for StateInferrer {
    fn default() -> Self {
        Self
    }
}

impl StateInferrer {
    pub fn new() -> Self {
        Self
    }

    pub fn infer(&self, intent: Intent, sequence: &DynamicSequence) -> AbstractState {
        let mut scores: Vec<(AbstractState, f32)> = vec![(AbstractState::NormalOperation, BASELINE_NORMAL_OPERATION)];

        let mouse_intensity = sequence.stat_features[4];
        let click_rate = sequence.stat_features[5];
        let alphanumeric_ratio = sequence.stat_features[2];
        let control_ratio = sequence.stat_features[3];
        let brightness = sequence.stat_features[6];

        scores.push((AbstractState::Idle, 1.0 - mouse_intensity - alphanumeric_ratio));

        match intent {
            Intent::Programming => scores.push((AbstractState::Focused, 0.8 + alphanumeric_ratio * 0.2)),
            Intent::Editing => scores.push((AbstractState::HighProductivity, 0.7 + control_ratio * 0.3)),
            Intent::Research => scores.push((AbstractState::SeekingInformation, 0.75)),
            Intent::Communication => scores.push((AbstractState::SocialInteraction, 0.75)),
            Intent::CreativeWork => scores.push((AbstractState::CreativeFlow, 0.8)),
            Intent::MediaConsumption => scores.push((AbstractState::PassiveConsumption, 0.7)),
            Intent::Gaming => scores.push((AbstractState::Distracted, 0.5 + click_rate * 0.3)),
            Intent::FastTyping => scores.push((AbstractState::HighProductivity, 0.6)),
            Intent::Idle => scores.push((AbstractState::Idle, 0.6)),
            Intent::Unknown => {}
        }

        if control_ratio > 0.3 && matches!(intent, Intent::Programming) {
            scores.push((AbstractState::Debugging, 0.6 + control_ratio));
        }

        if mouse_intensity < 0.1 && alphanumeric_ratio < 0.1 && !matches!(intent, Intent::Idle) {
            scores.push((AbstractState::Distracted, 0.55));
        } else if mouse_intensity > 0.2 && click_rate < 0.1 {
            scores.push((AbstractState::LowProductivity, 0.5));
        }

        if sequence.battery_pct < 20 && !sequence.battery_charging {
            scores.push((AbstractState::PowerSaving, 1.5));
        }

        if brightness == 0.0 && sequence.display_on {
            scores.push((AbstractState::HardwareAnomaly, 2.0));
        }

        scores
            .into_iter()
            .fold(None::<(AbstractState, f32)>, |acc, (state, score)| match acc {
                None => Some((state, score)),
                Some((best_state, best_score)) => {
                    if score > best_score {
                        Some((state, score))
                    } else {
                        Some((best_state, best_score))
                    }
                }
            })
            .map(|(state, _)| state)
            .unwrap_or(AbstractState::NormalOperation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_battery_not_charging_boosts_power_saving() {
        let inferrer = StateInferrer::new();
        let mut seq = DynamicSequence::default();
        seq.battery_pct = 10;
        seq.battery_charging = false;
        assert_eq!(inferrer.infer(Intent::Idle, &seq), AbstractState::PowerSaving);
    }

    #[test]
    fn zero_brightness_while_on_is_hardware_anomaly() {
        let inferrer = StateInferrer::new();
        let mut seq = DynamicSequence::default();
        seq.display_on = true;
        seq.stat_features[6] = 0.0;
        assert_eq!(inferrer.infer(Intent::Idle, &seq), AbstractState::HardwareAnomaly);
    }

    #[test]
    fn tie_breaks_to_normal_operation() {
        let inferrer = StateInferrer::new();
        let seq = DynamicSequence::default();
        let state = inferrer.infer(Intent::Unknown, &seq);
        assert!(matches!(state, AbstractState::NormalOperation | AbstractState::Idle));
    }
}
