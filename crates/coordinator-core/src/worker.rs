//! C2 — Worker: drains one input queue, invokes a type-specific handler,
//! pushes the handled item (or a replacement) to an output queue.
//!
//! The cooperative-shutdown-flag idiom uses a plain `Arc<AtomicBool>` rather
//! than a watch channel, since a Worker has no branching shutdown behavior
//! to react to — just a flag to check between items.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::item::{ErrorInfo, WorkItem};

/// Type-specific handling hook, overridden per worker type.
///
/// `handle` receives the item by mutable reference so a handler that only
/// sets `item.result` and returns `Ok(None)` still has its mutation carried
/// back to the Coordinator as the finished item — this is what lets an
/// "identity" handler (no successor, no result) still complete its barrier:
/// the *original* item, mutated or not, is always what gets enqueued on
/// success. Only a genuinely different successor item needs `Ok(Some(next))`.
#[async_trait]
pub trait Worker: Send {
    async fn handle(&mut self, item: &mut WorkItem) -> Result<Option<WorkItem>, ErrorInfo>;

    /// Called when the input queue yielded nothing within the poll
    /// interval. Default is a no-op.
    async fn idle(&mut self) {}
}

/// Generic poll/handle/emit loop shared by every Worker implementation.
pub struct WorkerLoop<W: Worker> {
    name: &'static str,
    worker: W,
    input: mpsc::Receiver<WorkItem>,
    output: mpsc::Sender<WorkItem>,
    poll_interval: Duration,
    stop: Arc<AtomicBool>,
}

impl<W: Worker + 'static> WorkerLoop<W> {
    /// Builds a loop and its cooperative stop handle. The caller owns
    /// `input`'s paired Sender (to feed work in) and `output`'s paired
    /// Receiver (to collect finished items) — or, inside a Coordinator,
    /// these are wired automatically by `Coordinator::register_worker`.
    pub fn new(
        name: &'static str,
        worker: W,
        input: mpsc::Receiver<WorkItem>,
        output: mpsc::Sender<WorkItem>,
        poll_interval: Duration,
    ) -> (Self, Arc<AtomicBool>) {
        let stop = Arc::new(AtomicBool::new(false));
        (
            Self {
                name,
                worker,
                input,
                output,
                poll_interval,
                stop: stop.clone(),
            },
            stop,
        )
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            if self.stop.load(Ordering::Acquire) {
                debug!(worker = self.name, "stop requested, exiting loop");
                break;
            }
            match tokio::time::timeout(self.poll_interval, self.input.recv()).await {
                Ok(Some(item)) => self.process(item).await,
                Ok(None) => {
                    debug!(worker = self.name, "input queue closed, exiting loop");
                    break;
                }
                Err(_elapsed) => self.worker.idle().await,
            }
        }
    }

    async fn process(&mut self, mut item: WorkItem) {
        let outcome = self.worker.handle(&mut item).await;
        let finished = match outcome {
            Ok(Some(next)) => next,
            Ok(None) => item,
            Err(e) => {
                debug!(worker = self.name, item_id = %item.id, error = %e, "handler error");
                item.error = Some(e);
                item
            }
        };
        if self.output.send(finished).await.is_err() {
            warn!(worker = self.name, "output queue closed, dropping finished item");
        }
    }
}
