//! Vote state machine.
//!
//! Three states, two inputs. Clicking the active direction retracts the vote,
//! clicking the opposite direction flips it in one step. The score delta is
//! always `next.value() - current.value()`.

pub mod item;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteState {
    Upvoted,
    Neutral,
    Downvoted,
}

impl VoteState {
    pub fn value(self) -> i64 {
        match self {
            VoteState::Upvoted => 1,
            VoteState::Neutral => 0,
            VoteState::Downvoted => -1,
        }
    }

    /// Parse the signed wire value (`vote_state` in server payloads).
    pub fn from_value(raw: i64) -> Result<Self, VoteError> {
        match raw {
            1 => Ok(VoteState::Upvoted),
            0 => Ok(VoteState::Neutral),
            -1 => Ok(VoteState::Downvoted),
            other => Err(VoteError::InvalidState(other)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VoteState::Upvoted => "upvoted",
            VoteState::Neutral => "neutral",
            VoteState::Downvoted => "downvoted",
        }
    }
}

impl TryFrom<i64> for VoteState {
    type Error = VoteError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        VoteState::from_value(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Upvote,
    Downvote,
}

impl VoteAction {
    pub fn sign(self) -> i64 {
        match self {
            VoteAction::Upvote => 1,
            VoteAction::Downvote => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VoteAction::Upvote => "upvote",
            VoteAction::Downvote => "downvote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("invalid vote state {0}, expected -1, 0 or 1")]
    InvalidState(i64),

    #[error("score overflow applying {delta:+} to {score}")]
    ScoreOverflow { score: i64, delta: i64 },
}

/// Next state for `(current, action)`. Total over all six pairs.
pub fn next_state(current: VoteState, action: VoteAction) -> VoteState {
    match (current, action) {
        (VoteState::Neutral, VoteAction::Upvote) => VoteState::Upvoted,
        (VoteState::Neutral, VoteAction::Downvote) => VoteState::Downvoted,
        (VoteState::Upvoted, VoteAction::Upvote) => VoteState::Neutral,
        (VoteState::Upvoted, VoteAction::Downvote) => VoteState::Downvoted,
        (VoteState::Downvoted, VoteAction::Upvote) => VoteState::Upvoted,
        (VoteState::Downvoted, VoteAction::Downvote) => VoteState::Neutral,
    }
}

/// Apply a click to `(current, current_score)`.
pub fn apply_vote(
    current: VoteState,
    current_score: i64,
    action: VoteAction,
) -> Result<(VoteState, i64), VoteError> {
    let next = next_state(current, action);
    let delta = next.value() - current.value();
    let score = current_score
        .checked_add(delta)
        .ok_or(VoteError::ScoreOverflow {
            score: current_score,
            delta,
        })?;
    Ok((next, score))
}

/// Same as [`apply_vote`] but takes the signed wire value for the current state.
pub fn apply_raw_vote(
    current: i64,
    current_score: i64,
    action: VoteAction,
) -> Result<(VoteState, i64), VoteError> {
    apply_vote(VoteState::from_value(current)?, current_score, action)
}

const UPVOTE_ICON: &str = "/img/upvote.png";
const UPVOTE_ICON_EMPTY: &str = "/img/upvote_empty.png";
const DOWNVOTE_ICON: &str = "/img/downvote.png";
const DOWNVOTE_ICON_EMPTY: &str = "/img/downvote_empty.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteVisual {
    pub upvote_icon_active: bool,
    pub downvote_icon_active: bool,
}

impl VoteVisual {
    pub fn upvote_icon(&self) -> &'static str {
        if self.upvote_icon_active {
            UPVOTE_ICON
        } else {
            UPVOTE_ICON_EMPTY
        }
    }

    pub fn downvote_icon(&self) -> &'static str {
        if self.downvote_icon_active {
            DOWNVOTE_ICON
        } else {
            DOWNVOTE_ICON_EMPTY
        }
    }
}

pub fn visual_for_state(state: VoteState) -> VoteVisual {
    VoteVisual {
        upvote_icon_active: state == VoteState::Upvoted,
        downvote_icon_active: state == VoteState::Downvoted,
    }
}
