//! Optimistic vote session.
//!
//! Owns the vote fields of every item on screen. A click is applied locally
//! right away; the submission runs on its own task and reports back through a
//! channel. Failed submissions are handled by the configured
//! [`ReconcilePolicy`] when outcomes are drained.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::backend::{BackendError, VoteBackend, VoteReceipt, VoteRequest};
use crate::logging::{log_reconcile, log_rollback, log_submit, log_transition};
use crate::vote::item::{ItemId, Snapshot, Transition, VotableItem};
use crate::vote::{apply_vote, VoteAction, VoteError, VoteVisual};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilePolicy {
    /// Once an item has nothing in flight and any of its submissions failed,
    /// show what the server recorded.
    #[default]
    Revert,
    /// Keep the optimistic state; failures are only logged.
    Preserve,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    #[error(transparent)]
    Vote(#[from] VoteError),
}

#[derive(Debug)]
pub struct VoteOutcome {
    pub transition: Transition,
    epoch: u64,
    pub result: Result<VoteReceipt, BackendError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileEvent {
    Confirmed(Transition),
    /// Failed under `Revert`; the item rolls back once its other submissions settle.
    Failed {
        transition: Transition,
        error: BackendError,
    },
    /// Failed under `Preserve`; optimistic state kept.
    Kept {
        transition: Transition,
        error: BackendError,
    },
    /// Item reset to the server's recorded vote.
    RolledBack {
        id: ItemId,
        from: Snapshot,
        to: Snapshot,
    },
}

struct Tracked {
    item: VotableItem,
    // distinguishes re-inserted items from stale outcomes
    epoch: u64,
    // vote as the server holds it: the loaded state plus every accepted toggle
    server: Snapshot,
    pending: usize,
    failed: bool,
}

pub struct VoteSession {
    items: HashMap<ItemId, Tracked>,
    backend: Arc<dyn VoteBackend + Send + Sync>,
    policy: ReconcilePolicy,
    tx: mpsc::UnboundedSender<VoteOutcome>,
    rx: mpsc::UnboundedReceiver<VoteOutcome>,
    in_flight: usize,
    next_epoch: u64,
}

impl VoteSession {
    pub fn new(backend: Arc<dyn VoteBackend + Send + Sync>, policy: ReconcilePolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            items: HashMap::new(),
            backend,
            policy,
            tx,
            rx,
            in_flight: 0,
            next_epoch: 0,
        }
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    /// Register an item as rendered. Replaces any previous copy; outcomes
    /// still in flight for the old copy no longer touch it.
    pub fn insert(&mut self, item: VotableItem) {
        self.next_epoch += 1;
        let server = item.snapshot();
        self.items.insert(
            item.id.clone(),
            Tracked {
                item,
                epoch: self.next_epoch,
                server,
                pending: 0,
                failed: false,
            },
        );
    }

    pub fn remove(&mut self, id: &ItemId) -> Option<VotableItem> {
        self.items.remove(id).map(|t| t.item)
    }

    pub fn get(&self, id: &ItemId) -> Option<&VotableItem> {
        self.items.get(id).map(|t| &t.item)
    }

    pub fn visual(&self, id: &ItemId) -> Option<VoteVisual> {
        self.get(id).map(VotableItem::visual)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Apply a click locally and submit it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn click(&mut self, id: &ItemId, action: VoteAction) -> Result<Transition, SessionError> {
        let tracked = self
            .items
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownItem(id.clone()))?;
        let transition = tracked.item.apply(action)?;
        tracked.pending += 1;
        let epoch = tracked.epoch;
        log_transition(&transition);

        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let pending = transition.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let request = VoteRequest::new(pending.id.clone(), pending.action);
            // A panicking backend still has to settle the click.
            let result = AssertUnwindSafe(backend.submit(&request))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(BackendError::Transport {
                        message: "vote submission panicked".to_string(),
                        retryable: false,
                    })
                });
            match &result {
                Ok(_) => log_submit(&pending, "accepted", None),
                Err(e) => log_submit(&pending, "rejected", Some(&e.to_string())),
            }
            // Receiver gone means the session was dropped; nothing to reconcile.
            let _ = tx.send(VoteOutcome {
                transition: pending,
                epoch,
                result,
            });
        });

        Ok(transition)
    }

    /// Handle every outcome that has already arrived, without waiting.
    pub fn reconcile_pending(&mut self) -> Vec<ReconcileEvent> {
        let mut events = Vec::new();
        while let Ok(outcome) = self.rx.try_recv() {
            self.reconcile(outcome, &mut events);
        }
        events
    }

    /// Wait for all in-flight submissions and handle their outcomes.
    pub async fn settle(&mut self) -> Vec<ReconcileEvent> {
        let mut events = Vec::new();
        while self.in_flight > 0 {
            match self.rx.recv().await {
                Some(outcome) => self.reconcile(outcome, &mut events),
                None => break,
            }
        }
        events
    }

    fn reconcile(&mut self, outcome: VoteOutcome, events: &mut Vec<ReconcileEvent>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let VoteOutcome {
            transition,
            epoch,
            result,
        } = outcome;

        let accepted = result.is_ok();
        let event = match (result, self.policy) {
            (Ok(_), _) => ReconcileEvent::Confirmed(transition.clone()),
            (Err(error), ReconcilePolicy::Revert) => ReconcileEvent::Failed {
                transition: transition.clone(),
                error,
            },
            (Err(error), ReconcilePolicy::Preserve) => ReconcileEvent::Kept {
                transition: transition.clone(),
                error,
            },
        };
        let resolution = match &event {
            ReconcileEvent::Confirmed(_) => "confirmed",
            ReconcileEvent::Failed { .. } => "failed",
            _ => "kept",
        };
        log_reconcile(&transition, resolution);
        events.push(event);

        let tracked = match self.items.get_mut(&transition.id) {
            Some(t) if t.epoch == epoch => t,
            _ => return,
        };
        tracked.pending = tracked.pending.saturating_sub(1);
        if accepted {
            // The server applies the same toggle rule to its own copy.
            let server = tracked.server;
            if let Ok((state, score)) = apply_vote(server.state, server.score, transition.action)
            {
                tracked.server = Snapshot { state, score };
            }
        } else if self.policy == ReconcilePolicy::Revert {
            tracked.failed = true;
        }

        if tracked.pending == 0 && tracked.failed {
            tracked.failed = false;
            let from = tracked.item.snapshot();
            let to = tracked.server;
            if from != to {
                tracked.item.restore(to);
                log_rollback(&transition.id, from, to);
                events.push(ReconcileEvent::RolledBack {
                    id: transition.id,
                    from,
                    to,
                });
            }
        }
    }
}
