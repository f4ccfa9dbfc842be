use crate::vote::item::{Snapshot, Transition, VotableItem};
use crate::vote::VoteState;

#[derive(Debug, Clone)]
pub struct InvariantViolation {
    pub msg: String,
}

/// Net score contributed by everyone except the current user.
pub fn others_score(snapshot: Snapshot) -> i64 {
    snapshot.score - snapshot.state.value()
}

/// A local transition never changes what other users contributed.
pub fn assert_transition_invariants(t: &Transition) -> Result<(), InvariantViolation> {
    if others_score(t.before) != others_score(t.after) {
        return Err(InvariantViolation {
            msg: format!(
                "{}: score moved by {} but vote only moved {} -> {}",
                t.id,
                t.delta(),
                t.before.state.as_str(),
                t.after.state.as_str()
            ),
        });
    }
    if t.before.state == t.after.state {
        return Err(InvariantViolation {
            msg: format!("{}: transition left vote state unchanged", t.id),
        });
    }
    if t.after.state != VoteState::Neutral && t.after.state.value() != t.action.sign() {
        return Err(InvariantViolation {
            msg: format!("{}: active vote does not match clicked direction", t.id),
        });
    }
    Ok(())
}

/// Compare an item against the baseline it was loaded with.
pub fn assert_item_consistent(
    item: &VotableItem,
    loaded: Snapshot,
) -> Result<(), InvariantViolation> {
    if others_score(item.snapshot()) != others_score(loaded) {
        return Err(InvariantViolation {
            msg: format!(
                "{}: score {} with state {} drifted from loaded baseline {}",
                item.id,
                item.score(),
                item.vote_state().as_str(),
                others_score(loaded)
            ),
        });
    }
    Ok(())
}
