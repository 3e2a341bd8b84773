//! Transaction approval queue.
//!
//! `eth_sendTransaction` parks here until the approval UI calls `approve` or
//! `reject`. Entries are kept in arrival order; with `RejectIfBusy` a second
//! submission fails instead of queueing. An entry whose caller has gone
//! away (task aborted, frame detached) is dropped as rejected.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{broadcast, oneshot};

use super::services::TransactionRequest;
use super::WalletError;
use crate::config::ApprovalPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingApproval {
    pub id: String,
    pub tx: TransactionRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ApprovalEvent {
    Queued(PendingApproval),
    Approved { id: String },
    Rejected { id: String },
}

struct Entry {
    approval: PendingApproval,
    decision: oneshot::Sender<Decision>,
}

pub struct ApprovalQueue {
    policy: ApprovalPolicy,
    queue: Mutex<VecDeque<Entry>>,
    events: broadcast::Sender<ApprovalEvent>,
}

impl ApprovalQueue {
    pub fn new(policy: ApprovalPolicy) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { policy, queue: Mutex::new(VecDeque::new()), events }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Entry>> {
        self.queue.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Queue with abandoned entries pruned.
    fn live(&self) -> MutexGuard<'_, VecDeque<Entry>> {
        let mut queue = self.lock();
        queue.retain(|entry| {
            if entry.decision.is_closed() {
                tracing::debug!(id = %entry.approval.id, "approval abandoned by its caller");
                let _ = self.events.send(ApprovalEvent::Rejected { id: entry.approval.id.clone() });
                return false;
            }
            true
        });
        queue
    }

    pub fn policy(&self) -> ApprovalPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalEvent> {
        self.events.subscribe()
    }

    pub fn submit(&self, id: impl Into<String>, tx: TransactionRequest) -> Result<oneshot::Receiver<Decision>, WalletError> {
        let approval = PendingApproval { id: id.into(), tx };
        let (decision, rx) = oneshot::channel();
        {
            let mut queue = self.live();
            if self.policy == ApprovalPolicy::RejectIfBusy && !queue.is_empty() {
                return Err(WalletError::Busy);
            }
            queue.push_back(Entry { approval: approval.clone(), decision });
        }
        tracing::info!(id = %approval.id, to = %approval.tx.to, "transaction awaiting approval");
        let _ = self.events.send(ApprovalEvent::Queued(approval));
        Ok(rx)
    }

    /// Head of the queue: what the approval UI should show now.
    pub fn current(&self) -> Option<PendingApproval> {
        self.live().front().map(|e| e.approval.clone())
    }

    pub fn pending(&self) -> Vec<PendingApproval> {
        self.live().iter().map(|e| e.approval.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live().is_empty()
    }

    fn settle(&self, id: &str, decision: Decision) -> bool {
        let entry = {
            let mut queue = self.live();
            let Some(index) = queue.iter().position(|e| e.approval.id == id) else {
                return false;
            };
            queue.remove(index)
        };
        let Some(entry) = entry else {
            return false;
        };
        let _ = entry.decision.send(decision);
        let event = match decision {
            Decision::Approved => ApprovalEvent::Approved { id: id.to_string() },
            Decision::Rejected => ApprovalEvent::Rejected { id: id.to_string() },
        };
        let _ = self.events.send(event);
        true
    }

    pub fn approve(&self, id: &str) -> bool {
        self.settle(id, Decision::Approved)
    }

    pub fn reject(&self, id: &str) -> bool {
        self.settle(id, Decision::Rejected)
    }

    /// Reject everything queued. Returns how many were rejected.
    pub fn reject_all(&self) -> usize {
        let drained: Vec<Entry> = self.lock().drain(..).collect();
        let count = drained.len();
        for entry in drained {
            let _ = entry.decision.send(Decision::Rejected);
            let _ = self.events.send(ApprovalEvent::Rejected { id: entry.approval.id });
        }
        count
    }
}
