//! Consensus views and protocol steps.

use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;

/// The five HotStuff steps of a round, in protocol order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
#[repr(u8)]
#[borsh(use_discriminant = true)]
pub enum Step {
    NewRound = 0,
    Prepare = 1,
    PreCommit = 2,
    Commit = 3,
    Decide = 4,
}

impl Step {
    /// The step that follows this one within a round, if any.
    pub fn next(self) -> Option<Step> {
        match self {
            Step::NewRound => Some(Step::Prepare),
            Step::Prepare => Some(Step::PreCommit),
            Step::PreCommit => Some(Step::Commit),
            Step::Commit => Some(Step::Decide),
            Step::Decide => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Step::NewRound => "NewRound",
            Step::Prepare => "Prepare",
            Step::PreCommit => "PreCommit",
            Step::Commit => "Commit",
            Step::Decide => "Decide",
        }
    }
}

/// A point in consensus time: `(height, round, step)`.
///
/// Views are totally ordered lexicographically and a node's current view is
/// monotone non-decreasing. The derived `Ord` relies on the field order
/// below, so it must stay `height`, `round`, `step`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct View {
    pub height: u64,
    pub round: u32,
    pub step: Step,
}

impl View {
    /// The first view of a fresh chain.
    pub fn genesis() -> Self {
        View {
            height: 1,
            round: 0,
            step: Step::NewRound,
        }
    }

    /// The first view of the given height.
    pub fn start_of_height(height: u64) -> Self {
        View {
            height,
            round: 0,
            step: Step::NewRound,
        }
    }

    /// Same height and round, next step. `None` after `Decide`.
    pub fn next_step(self) -> Option<View> {
        self.step.next().map(|step| View { step, ..self })
    }

    /// Next round at the same height, back at `NewRound`.
    pub fn next_round(self) -> View {
        View {
            height: self.height,
            round: self.round + 1,
            step: Step::NewRound,
        }
    }

    /// True when `self` and `other` share height and round.
    pub fn same_round(&self, other: &View) -> bool {
        self.height == other.height && self.round == other.round
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.height, self.round, self.step.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_ordering_is_lexicographic() {
        let base = View {
            height: 5,
            round: 1,
            step: Step::Prepare,
        };
        assert!(base < View { height: 6, round: 0, step: Step::NewRound });
        assert!(base < View { height: 5, round: 2, step: Step::NewRound });
        assert!(base < View { height: 5, round: 1, step: Step::PreCommit });
        assert!(base > View { height: 5, round: 1, step: Step::NewRound });
    }

    #[test]
    fn steps_advance_in_protocol_order() {
        let mut step = Step::NewRound;
        let mut seen = vec![step];
        while let Some(next) = step.next() {
            seen.push(next);
            step = next;
        }
        assert_eq!(
            seen,
            vec![
                Step::NewRound,
                Step::Prepare,
                Step::PreCommit,
                Step::Commit,
                Step::Decide
            ]
        );
    }
}
