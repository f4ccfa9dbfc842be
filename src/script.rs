//! JSON-lines click scripts, replayed through a [`VoteSession`].

use std::collections::HashMap;
use std::io::BufRead;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::session::{ReconcileEvent, VoteSession};
use crate::verify::invariants::assert_item_consistent;
use crate::vote::item::{ItemId, Snapshot, VotableItem, VotePayload};
use crate::vote::{VoteAction, VoteState};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptEvent {
    Item {
        thread: String,
        message_id: u64,
        #[serde(default)]
        comment_id: Option<u64>,
        vote_state: i64,
        up_votes: i64,
        down_votes: i64,
    },
    Click {
        thread: String,
        message_id: u64,
        #[serde(default)]
        comment_id: Option<u64>,
        action: VoteAction,
    },
}

fn item_id(thread: &str, message_id: u64, comment_id: Option<u64>) -> ItemId {
    match comment_id {
        Some(c) => ItemId::comment(thread, message_id, c),
        None => ItemId::message(thread, message_id),
    }
}

/// What a renderer would show for one item after a line was applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendered {
    pub item_id: String,
    pub vote_state: VoteState,
    pub score: i64,
    pub upvote_icon: &'static str,
    pub downvote_icon: &'static str,
}

impl Rendered {
    fn of(item: &VotableItem) -> Self {
        let visual = item.visual();
        Self {
            item_id: item.id.to_string(),
            vote_state: item.vote_state(),
            score: item.score(),
            upvote_icon: visual.upvote_icon(),
            downvote_icon: visual.downvote_icon(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReplayReport {
    pub rendered: Vec<Rendered>,
    pub reconciled: Vec<ReconcileEvent>,
    pub final_items: Vec<Rendered>,
}

pub fn parse_line(line: &str) -> Result<Option<ScriptEvent>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

/// Replay every line, settle pending submissions, then check that no item
/// drifted from the score it was loaded with.
pub async fn replay<R: BufRead>(reader: R, session: &mut VoteSession) -> Result<ReplayReport> {
    let mut report = ReplayReport::default();
    let mut loaded: HashMap<ItemId, Snapshot> = HashMap::new();
    let mut order: Vec<ItemId> = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("reading line {}", line_no))?;
        let event = match parse_line(&line).with_context(|| format!("line {}", line_no))? {
            Some(e) => e,
            None => continue,
        };

        let id = match event {
            ScriptEvent::Item {
                thread,
                message_id,
                comment_id,
                vote_state,
                up_votes,
                down_votes,
            } => {
                let id = item_id(&thread, message_id, comment_id);
                let payload = VotePayload {
                    vote_state,
                    up_votes,
                    down_votes,
                };
                let item = VotableItem::from_payload(id.clone(), &payload)
                    .with_context(|| format!("line {}: item {}", line_no, id))?;
                if loaded.insert(id.clone(), item.snapshot()).is_none() {
                    order.push(id.clone());
                }
                session.insert(item);
                id
            }
            ScriptEvent::Click {
                thread,
                message_id,
                comment_id,
                action,
            } => {
                let id = item_id(&thread, message_id, comment_id);
                session
                    .click(&id, action)
                    .with_context(|| format!("line {}: click", line_no))?;
                id
            }
        };

        report.reconciled.extend(session.reconcile_pending());
        let item = session
            .get(&id)
            .ok_or_else(|| anyhow!("line {}: item {} vanished", line_no, id))?;
        report.rendered.push(Rendered::of(item));
    }

    report.reconciled.extend(session.settle().await);

    for id in &order {
        let item = match session.get(id) {
            Some(item) => item,
            None => continue,
        };
        if let Some(snapshot) = loaded.get(id) {
            if let Err(v) = assert_item_consistent(item, *snapshot) {
                bail!("invariant violated: {}", v.msg);
            }
        }
        report.final_items.push(Rendered::of(item));
    }
    Ok(report)
}
