//! C4 — Barrier: the Coordinator's bookkeeping for one outstanding yield.
//!
//! Fail-fast policy: wait-all-then-resume. A barrier records its first
//! error but still waits for every outstanding sibling to report before
//! resuming the parent (see DESIGN.md Open Question 2) — resuming on the
//! first error would leave stragglers with nowhere to report to.

use std::collections::{HashMap, HashSet};

use tokio::sync::oneshot;

use crate::item::{ErrorInfo, WorkItemId};
use crate::workflow::YieldOutcome;

pub(crate) struct Barrier {
    was_list: bool,
    remaining: usize,
    first_error: Option<ErrorInfo>,
    slots: Vec<Option<YieldOutcome>>,
    error_slots: HashSet<usize>,
    index_of: HashMap<WorkItemId, usize>,
    reply: oneshot::Sender<Result<Vec<YieldOutcome>, ErrorInfo>>,
}

impl Barrier {
    pub fn new(
        ids: &[WorkItemId],
        was_list: bool,
        reply: oneshot::Sender<Result<Vec<YieldOutcome>, ErrorInfo>>,
    ) -> Self {
        let index_of = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        Self {
            was_list,
            remaining: ids.len(),
            first_error: None,
            slots: ids.iter().map(|_| None).collect(),
            error_slots: HashSet::new(),
            index_of,
            reply,
        }
    }

    pub fn was_list(&self) -> bool {
        self.was_list
    }

    /// Marks `id` as finished with `outcome`. Idempotent with respect to an
    /// id that has already reported: a second call is a no-op.
    /// Returns `true` once `remaining == 0` — the barrier never resumes the
    /// parent on the first error while siblings are still outstanding.
    pub fn finish(&mut self, id: WorkItemId, outcome: Result<YieldOutcome, ErrorInfo>) -> bool {
        let Some(&idx) = self.index_of.get(&id) else {
            return self.remaining == 0;
        };
        let already_reported = self.slots[idx].is_some() || self.error_slots.contains(&idx);
        if already_reported {
            return self.remaining == 0;
        }
        match outcome {
            Ok(value) => self.slots[idx] = Some(value),
            Err(e) => {
                self.error_slots.insert(idx);
                if self.first_error.is_none() {
                    self.first_error = Some(e);
                }
            }
        }
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }

    /// Consumes the barrier, producing the value to inject at the parent's
    /// yield site and the channel to send it through.
    pub fn complete(self) -> (oneshot::Sender<Result<Vec<YieldOutcome>, ErrorInfo>>, Result<Vec<YieldOutcome>, ErrorInfo>) {
        let value = match self.first_error {
            Some(e) => Err(e),
            None => Ok(self
                .slots
                .into_iter()
                .map(|slot| slot.expect("barrier slot unfilled at completion"))
                .collect()),
        };
        (self.reply, value)
    }
}
