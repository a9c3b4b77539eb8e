//! Shared action vocabulary.
//!
//! `Action` is referenced by intent templates (C3), insights (C6), the
//! planner (C8), and the Q-learner (C9) — it lives in its own module so
//! none of those four has to depend on another's module just to name an
//! action.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    LaunchApplication,
    SuggestBreak,
    DimDisplay,
    EnableBatterySaver,
    MuteNotifications,
    OfferHelp,
    SummarizeContext,
    FlagSecurityConcern,
    SuggestRelatedKnowledge,
    ReorganizeWorkspace,
    PromptForFeedback,
    NoOp,
}

impl Action {
    /// Stable ordinal used for deterministic tie-breaking (smaller index wins).
    pub fn index(&self) -> u8 {
        match self {
            Action::LaunchApplication => 0,
            Action::SuggestBreak => 1,
            Action::DimDisplay => 2,
            Action::EnableBatterySaver => 3,
            Action::MuteNotifications => 4,
            Action::OfferHelp => 5,
            Action::SummarizeContext => 6,
            Action::FlagSecurityConcern => 7,
            Action::SuggestRelatedKnowledge => 8,
            Action::ReorganizeWorkspace => 9,
            Action::PromptForFeedback => 10,
            Action::NoOp => 11,
        }
    }

    pub const ALL: [Action; 12] = [
        Action::LaunchApplication,
        Action::SuggestBreak,
        Action::DimDisplay,
        Action::EnableBatterySaver,
        Action::MuteNotifications,
        Action::OfferHelp,
        Action::SummarizeContext,
        Action::FlagSecurityConcern,
        Action::SuggestRelatedKnowledge,
        Action::ReorganizeWorkspace,
        Action::PromptForFeedback,
        Action::NoOp,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
