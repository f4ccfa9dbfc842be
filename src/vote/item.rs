use std::fmt;

use serde::{Deserialize, Serialize};

use super::{apply_vote, visual_for_state, VoteAction, VoteError, VoteState, VoteVisual};

/// Address of a votable post or comment. Comments are reached through their
/// parent message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemId {
    Message {
        thread: String,
        message_id: u64,
    },
    Comment {
        thread: String,
        message_id: u64,
        comment_id: u64,
    },
}

impl ItemId {
    pub fn message(thread: impl Into<String>, message_id: u64) -> Self {
        ItemId::Message {
            thread: thread.into(),
            message_id,
        }
    }

    pub fn comment(thread: impl Into<String>, message_id: u64, comment_id: u64) -> Self {
        ItemId::Comment {
            thread: thread.into(),
            message_id,
            comment_id,
        }
    }

    pub fn thread(&self) -> &str {
        match self {
            ItemId::Message { thread, .. } | ItemId::Comment { thread, .. } => thread,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Message { thread, message_id } => write!(f, "{}/m/{}", thread, message_id),
            ItemId::Comment {
                thread,
                message_id,
                comment_id,
            } => write!(f, "{}/m/{}/c/{}", thread, message_id, comment_id),
        }
    }
}

/// Vote fields as delivered by the server for the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotePayload {
    pub vote_state: i64,
    pub up_votes: i64,
    pub down_votes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub state: VoteState,
    pub score: i64,
}

/// One applied click: what the item looked like before and after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub id: ItemId,
    pub action: VoteAction,
    pub before: Snapshot,
    pub after: Snapshot,
}

impl Transition {
    pub fn delta(&self) -> i64 {
        self.after.score - self.before.score
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VotableItem {
    pub id: ItemId,
    score: i64,
    vote_state: VoteState,
}

impl VotableItem {
    pub fn new(id: ItemId, vote_state: VoteState, score: i64) -> Self {
        Self {
            id,
            score,
            vote_state,
        }
    }

    pub fn from_payload(id: ItemId, payload: &VotePayload) -> Result<Self, VoteError> {
        let vote_state = VoteState::from_value(payload.vote_state)?;
        let score = payload
            .up_votes
            .checked_sub(payload.down_votes)
            .ok_or(VoteError::ScoreOverflow {
                score: payload.up_votes,
                delta: payload.down_votes.saturating_neg(),
            })?;
        Ok(Self::new(id, vote_state, score))
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn vote_state(&self) -> VoteState {
        self.vote_state
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.vote_state,
            score: self.score,
        }
    }

    pub fn visual(&self) -> VoteVisual {
        visual_for_state(self.vote_state)
    }

    /// Apply a click. Both fields change together or not at all.
    pub fn apply(&mut self, action: VoteAction) -> Result<Transition, VoteError> {
        let before = self.snapshot();
        let (state, score) = apply_vote(self.vote_state, self.score, action)?;
        self.vote_state = state;
        self.score = score;
        Ok(Transition {
            id: self.id.clone(),
            action,
            before,
            after: self.snapshot(),
        })
    }

    pub(crate) fn restore(&mut self, snapshot: Snapshot) {
        self.vote_state = snapshot.state;
        self.score = snapshot.score;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_payload() {
        let payload = VotePayload {
            vote_state: -1,
            up_votes: 7,
            down_votes: 2,
        };
        let item = VotableItem::from_payload(ItemId::message("rust", 4), &payload).unwrap();
        assert_eq!(item.score(), 5);
        assert_eq!(item.vote_state(), VoteState::Downvoted);
        assert!(item.visual().downvote_icon_active);
    }

    #[test]
    fn test_from_payload_rejects_bad_state() {
        let payload = VotePayload {
            vote_state: 422,
            up_votes: 0,
            down_votes: 0,
        };
        let err = VotableItem::from_payload(ItemId::message("rust", 4), &payload).unwrap_err();
        assert_eq!(err, VoteError::InvalidState(422));
    }

    #[test]
    fn test_apply_records_transition() {
        let id = ItemId::comment("rust", 4, 9);
        let mut item = VotableItem::new(id.clone(), VoteState::Upvoted, 3);
        let t = item.apply(VoteAction::Downvote).unwrap();
        assert_eq!(t.id, id);
        assert_eq!(t.before, Snapshot { state: VoteState::Upvoted, score: 3 });
        assert_eq!(t.after, Snapshot { state: VoteState::Downvoted, score: 1 });
        assert_eq!(t.delta(), -2);
        assert_eq!(item.snapshot(), t.after);
    }

    #[test]
    fn test_failed_apply_leaves_item_untouched() {
        let mut item = VotableItem::new(ItemId::message("rust", 1), VoteState::Neutral, i64::MAX);
        assert!(item.apply(VoteAction::Upvote).is_err());
        assert_eq!(item.score(), i64::MAX);
        assert_eq!(item.vote_state(), VoteState::Neutral);
    }

    #[test]
    fn test_item_id_display() {
        assert_eq!(ItemId::message("general", 12).to_string(), "general/m/12");
        assert_eq!(ItemId::comment("general", 12, 3).to_string(), "general/m/12/c/3");
    }
}
