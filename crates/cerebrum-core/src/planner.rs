//! C8 — Planner: produces an ordered action plan per
//! (intent, abstract state, goal). Never executes actions itself.

use crate::action::Action;
use crate::goals::Goal;
use crate::intent::Intent;
use crate::signals::DynamicSequence;
use crate::state::AbstractState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlanStep {
    pub action: Action,
    pub rationale: String,
    pub expected_outcome_confidence: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<ActionPlanStep>,
}

pub struct Planner;

impl Default for Planner {
    fn default() -> Self {
        Self
    }
}

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Builds a plan via a cascade of intent/state/goal-specific rule
    /// blocks; every goal has a deterministic default step if no rule
    /// fires, so `steps` is never empty.
    pub fn create_plan(&self, intent: Intent, state: AbstractState, goal: Goal, sequence: &DynamicSequence) -> Plan {
        let mut steps = Vec::new();

        match goal {
            Goal::EnsureSecurity => {
                steps.push(ActionPlanStep {
                    action: Action::FlagSecurityConcern,
                    rationale: "security alert insight is active".into(),
                    expected_outcome_confidence: 0.9,
                });
            }
            Goal::MaximizeBatteryLife => {
                steps.push(ActionPlanStep {
                    action: Action::EnableBatterySaver,
                    rationale: "battery below threshold and not charging".into(),
                    expected_outcome_confidence: 0.85,
                });
                if sequence.stat_features[6] > 0.5 {
                    steps.push(ActionPlanStep {
                        action: Action::DimDisplay,
                        rationale: "brightness is high while conserving power".into(),
                        expected_outcome_confidence: 0.6,
                    });
                }
            }
            Goal::ReduceDistractions => {
                steps.push(ActionPlanStep {
                    action: Action::MuteNotifications,
                    rationale: "abstract state indicates distraction".into(),
                    expected_outcome_confidence: 0.7,
                });
                if matches!(state, AbstractState::LowProductivity) {
                    steps.push(ActionPlanStep {
                        action: Action::ReorganizeWorkspace,
                        rationale: "low productivity state observed".into(),
                        expected_outcome_confidence: 0.5,
                    });
                }
            }
            Goal::SelfImprovement => {
                steps.push(ActionPlanStep {
                    action: Action::PromptForFeedback,
                    rationale: "behavioral drift detected, request calibration signal".into(),
                    expected_outcome_confidence: 0.55,
                });
            }
            Goal::ExploreNewKnowledge => {
                steps.push(ActionPlanStep {
                    action: Action::SuggestRelatedKnowledge,
                    rationale: "goal is explicit knowledge exploration".into(),
                    expected_outcome_confidence: 0.6,
                });
            }
            Goal::ConserveResources => {
                steps.push(ActionPlanStep {
                    action: Action::EnableBatterySaver,
                    rationale: "conserve-resources goal active".into(),
                    expected_outcome_confidence: 0.5,
                });
            }
            Goal::MaintainUserSatisfaction => {
                steps.push(ActionPlanStep {
                    action: Action::OfferHelp,
                    rationale: "maintain-satisfaction goal active".into(),
                    expected_outcome_confidence: 0.5,
                });
            }
            Goal::OptimizeProductivity => match intent {
                Intent::Programming | Intent::Editing => {
                    steps.push(ActionPlanStep {
                        action: Action::SummarizeContext,
                        rationale: "high-focus coding/editing intent observed".into(),
                        expected_outcome_confidence: 0.65,
                    });
                }
                Intent::Research => {
                    steps.push(ActionPlanStep {
                        action: Action::SuggestRelatedKnowledge,
                        rationale: "research intent observed".into(),
                        expected_outcome_confidence: 0.6,
                    });
                }
                _ => {}
            },
        }

        if matches!(state, AbstractState::Debugging) {
            steps.push(ActionPlanStep {
                action: Action::SuggestBreak,
                rationale: "extended debugging session may benefit from a break".into(),
                expected_outcome_confidence: 0.4,
            });
        }

        if steps.is_empty() {
            steps.push(ActionPlanStep {
                action: Action::NoOp,
                rationale: "no rule matched current (intent, state, goal); deterministic default".into(),
                expected_outcome_confidence: 0.3,
            });
        }

        Plan { steps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_goal_produces_at_least_one_step() {
        let planner = Planner::new();
        let seq = DynamicSequence::default();
        for goal in [
            Goal::OptimizeProductivity,
            Goal::MaximizeBatteryLife,
            Goal::ReduceDistractions,
            Goal::EnsureSecurity,
            Goal::MaintainUserSatisfaction,
            Goal::ConserveResources,
            Goal::ExploreNewKnowledge,
            Goal::SelfImprovement,
        ] {
            let plan = planner.create_plan(Intent::Unknown, AbstractState::NormalOperation, goal, &seq);
            assert!(!plan.steps.is_empty());
        }
    }

    #[test]
    fn security_goal_flags_concern() {
        let planner = Planner::new();
        let seq = DynamicSequence::default();
        let plan = planner.create_plan(Intent::Unknown, AbstractState::NormalOperation, Goal::EnsureSecurity, &seq);
        assert_eq!(plan.steps[0].action, Action::FlagSecurityConcern);
    }
}
