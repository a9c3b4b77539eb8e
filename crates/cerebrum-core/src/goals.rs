//! C7 — Goal Arbiter: selects a single active goal from insights,
//! battery, network, and abstract state via a priority-ordered,
//! short-circuit policy. No hysteresis — callers may observe
//! oscillation and should treat rapid changes as signal.

use crate::insights::{Insight, InsightKind};
use crate::state::AbstractState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Goal {
    OptimizeProductivity,
    MaximizeBatteryLife,
    ReduceDistractions,
    EnsureSecurity,
    MaintainUserSatisfaction,
    ConserveResources,
    ExploreNewKnowledge,
    SelfImprovement,
}

const SECURITY_URGENCY_THRESHOLD: f32 = 0.7;
const DRIFT_URGENCY_THRESHOLD: f32 = 0.6;
const LOW_BATTERY_THRESHOLD: u8 = 20;

pub struct GoalArbiter {
    active: Goal,
}

impl Default for GoalArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl GoalArbiter {
    pub fn new() -> Self {
        Self {
            active: Goal::OptimizeProductivity,
        }
    }

    pub fn active_goal(&self) -> Goal {
        self.active
    }

    /// Returns `Some(new_goal)` when the goal changed this tick, for
    /// callers that want to emit a goal-change event; the arbiter applies
    /// no hysteresis, so rapid oscillation is possible and intentional.
    pub fn arbitrate(&mut self, insights: &[Insight], state: AbstractState, battery_pct: u8, battery_charging: bool) -> Option<Goal> {
        let next = if insights
            .iter()
            .any(|i| i.kind == InsightKind::SecurityAlert && i.urgency >= SECURITY_URGENCY_THRESHOLD)
        {
            Goal::EnsureSecurity
        } else if battery_pct < LOW_BATTERY_THRESHOLD && !battery_charging {
            Goal::MaximizeBatteryLife
        } else if insights
            .iter()
            .any(|i| i.kind == InsightKind::BehavioralDrift && i.urgency >= DRIFT_URGENCY_THRESHOLD)
        {
            Goal::SelfImprovement
        } else if matches!(state, AbstractState::Distracted | AbstractState::LowProductivity) {
            Goal::ReduceDistractions
        } else {
            Goal::OptimizeProductivity
        };

        if next != self.active {
            self.active = next;
            Some(next)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;

    #[test]
    fn security_alert_takes_priority() {
        let mut arbiter = GoalArbiter::new();
        let insights = vec![Insight::new(InsightKind::SecurityAlert, 0.9, "x", Action::FlagSecurityConcern)];
        arbiter.arbitrate(&insights, AbstractState::NormalOperation, 100, true);
        assert_eq!(arbiter.active_goal(), Goal::EnsureSecurity);
    }

    #[test]
    fn low_battery_overrides_productivity() {
        let mut arbiter = GoalArbiter::new();
        arbiter.arbitrate(&[], AbstractState::NormalOperation, 10, false);
        assert_eq!(arbiter.active_goal(), Goal::MaximizeBatteryLife);
    }

    #[test]
    fn default_falls_back_to_optimize_productivity() {
        let mut arbiter = GoalArbiter::new();
        let changed = arbiter.arbitrate(&[], AbstractState::NormalOperation, 100, true);
        assert!(changed.is_none());
        assert_eq!(arbiter.active_goal(), Goal::OptimizeProductivity);
    }
}
