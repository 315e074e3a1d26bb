//! C5 — Coordinator: routing table, pending table, the dispatch loop
//! (Classify / Advance / Dispatch / Complete), and fleet lifecycle.
//!
//! Runtime topology: one dedicated OS thread hosts a single-threaded Tokio
//! runtime and a `LocalSet`. The dispatch loop and every workflow
//! procedure's task are `spawn_local`'d onto that `LocalSet`, so they can
//! never run concurrently with each other — a workflow procedure never
//! executes concurrently with itself or with any other workflow procedure,
//! by construction. Registered Workers run as ordinary `tokio::spawn` tasks
//! on the embedder's ambient multi-thread runtime; they have no suspension
//! points the Coordinator cares about.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::barrier::Barrier;
use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::item::{ErrorInfo, TypeTag, WorkItem, WorkItemId};
use crate::worker::{Worker, WorkerLoop};
use crate::workflow::{DispatchRequest, Workflow, WorkflowRegistry, YieldCtx, YieldOutcome, YieldSpec};

/// Messages the dispatch loop consumes outside of the dedicated `Dispatch`
/// and `Returned` channels. Kept separate from those two so a plain
/// `tokio::select!` can drive all three without a unifying forwarder task.
enum Inbox {
    /// A fresh root workflow submitted by the embedder.
    Submit {
        id: WorkItemId,
        type_tag: TypeTag,
        args: Value,
        root: bool,
    },
    /// A workflow procedure's future has resolved.
    WorkflowDone {
        id: WorkItemId,
        outcome: Result<Option<Value>, ErrorInfo>,
    },
    /// Asks the dispatch loop to exit at the next opportunity.
    Shutdown,
}

struct WorkerHandle {
    stop: Arc<AtomicBool>,
    join: tokio::task::JoinHandle<()>,
}

struct PendingWorker {
    type_tag: TypeTag,
    build: Box<dyn FnOnce(mpsc::Sender<WorkItem>) -> (tokio::task::JoinHandle<()>, Arc<AtomicBool>)>,
}

/// Bookkeeping the Coordinator carries about a workflow it has instantiated,
/// enough to rebuild its final `Workflow` record at `WorkflowDone` time.
struct WorkflowMeta {
    type_tag: TypeTag,
    args: Value,
    root: bool,
}

/// The Coordinator itself — owns the routing table, the pending table, and
/// the fleet of registered child workers.
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: Arc<WorkflowRegistry>,
    routing: HashMap<TypeTag, mpsc::Sender<WorkItem>>,
    pending_workers: Vec<PendingWorker>,
    worker_handles: Vec<WorkerHandle>,
    inbox_tx: mpsc::Sender<Inbox>,
    inbox_rx: Option<mpsc::Receiver<Inbox>>,
    dispatch_tx: mpsc::Sender<DispatchRequest>,
    dispatch_rx: Option<mpsc::Receiver<DispatchRequest>>,
    returns_tx: mpsc::Sender<WorkItem>,
    returns_rx: Option<mpsc::Receiver<WorkItem>>,
    output_tx: mpsc::Sender<Workflow>,
    output_rx: Arc<Mutex<mpsc::Receiver<Workflow>>>,
    thread_done: Option<oneshot::Receiver<()>>,
    started: bool,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, registry: WorkflowRegistry) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(config.channel_capacity);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.channel_capacity);
        let (returns_tx, returns_rx) = mpsc::channel(config.channel_capacity);
        let (output_tx, output_rx) = mpsc::channel(config.channel_capacity);

        Self {
            config,
            registry: Arc::new(registry),
            routing: HashMap::new(),
            pending_workers: Vec::new(),
            worker_handles: Vec::new(),
            inbox_tx,
            inbox_rx: Some(inbox_rx),
            dispatch_tx,
            dispatch_rx: Some(dispatch_rx),
            returns_tx,
            returns_rx: Some(returns_rx),
            output_tx,
            output_rx: Arc::new(Mutex::new(output_rx)),
            thread_done: None,
            started: false,
        }
    }

    /// Declares that yielded items of `type_tag` route to `queue`.
    /// Workflow-typed yields never go through this table — they are always
    /// driven in-process.
    pub fn register(&mut self, type_tag: TypeTag, queue: mpsc::Sender<WorkItem>) {
        self.routing.insert(type_tag, queue);
    }

    /// Convenience over `register`: builds a channel, wraps `worker` in a
    /// `WorkerLoop` wired to the Coordinator's own returns channel, and
    /// registers the resulting input sender under `type_tag`. The worker
    /// does not actually start running until `Coordinator::start` — it is
    /// spawned then, alongside every other registered worker.
    pub fn register_worker<W: Worker + 'static>(&mut self, type_tag: TypeTag, worker: W) {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        self.register(type_tag, tx);
        let poll_interval = self.config.poll_interval;
        self.pending_workers.push(PendingWorker {
            type_tag,
            build: Box::new(move |output| {
                let (worker_loop, stop) =
                    WorkerLoop::new(type_tag, worker, rx, output, poll_interval);
                (worker_loop.spawn(), stop)
            }),
        });
    }

    /// Starts every registered child worker, then starts the Coordinator's
    /// own dispatch loop on its dedicated thread. Must be called from
    /// within a Tokio runtime context — the registered workers are spawned
    /// onto the calling context's ambient runtime.
    pub fn start(&mut self) -> Result<(), CoordinatorError> {
        if self.started {
            return Ok(());
        }
        for pending in self.pending_workers.drain(..) {
            let (join, stop) = (pending.build)(self.returns_tx.clone());
            info!(worker = pending.type_tag, "worker started");
            self.worker_handles.push(WorkerHandle { stop, join });
        }

        let inbox_rx = self
            .inbox_rx
            .take()
            .expect("inbox only taken once, at start()");
        let dispatch_rx = self
            .dispatch_rx
            .take()
            .expect("dispatch channel only taken once, at start()");
        let returns_rx = self
            .returns_rx
            .take()
            .expect("returns channel only taken once, at start()");
        let registry = self.registry.clone();
        let routing = self.routing.clone();
        let dispatch_tx = self.dispatch_tx.clone();
        let inbox_tx_self = self.inbox_tx.clone();
        let output_tx = self.output_tx.clone();

        let (done_tx, done_rx) = oneshot::channel();
        self.thread_done = Some(done_rx);

        std::thread::Builder::new()
            .name("coordinator-dispatch".into())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build coordinator runtime");
                let local = tokio::task::LocalSet::new();
                local.block_on(
                    &rt,
                    dispatch_loop(
                        inbox_rx,
                        dispatch_rx,
                        returns_rx,
                        registry,
                        routing,
                        dispatch_tx,
                        inbox_tx_self,
                        output_tx,
                    ),
                );
                let _ = done_tx.send(());
            })
            .expect("failed to spawn coordinator dispatch thread");

        self.started = true;
        Ok(())
    }

    /// Signals cooperative termination to every child worker and to the
    /// Coordinator's own dispatch loop. Idempotent; never blocks.
    pub fn stop(&self) {
        for handle in &self.worker_handles {
            handle.stop.store(true, Ordering::Release);
        }
        let _ = self.inbox_tx.try_send(Inbox::Shutdown);
    }

    /// Stops the fleet, then waits for every child worker and the dispatch
    /// loop to terminate.
    pub async fn join(mut self) -> Result<(), CoordinatorError> {
        self.stop();
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join.await;
        }
        if let Some(done) = self.thread_done.take() {
            let _ = done.await;
        }
        Ok(())
    }

    /// Enqueues a root workflow. Returns its id immediately; the embedder
    /// learns the outcome via `wait_until_done`.
    pub async fn submit(&self, type_tag: TypeTag, args: Value) -> Result<WorkItemId, CoordinatorError> {
        if !self.started {
            return Err(CoordinatorError::NotStarted);
        }
        let id = WorkItemId::new();
        self.inbox_tx
            .send(Inbox::Submit {
                id,
                type_tag,
                args,
                root: true,
            })
            .await
            .map_err(|_| CoordinatorError::Shutdown)?;
        Ok(id)
    }

    /// Blocks until a root workflow emerges on the output queue, calls
    /// `check()` on it, and returns it. Safe to call concurrently from
    /// multiple tasks waiting on distinct roots — each completed root is
    /// delivered to exactly one waiter.
    pub async fn wait_until_done(&self) -> Result<Workflow, CoordinatorError> {
        let mut rx = self.output_rx.lock().await;
        let workflow = rx.recv().await.ok_or(CoordinatorError::Shutdown)?;
        workflow.check()?;
        Ok(workflow)
    }
}

/// The Coordinator's single-threaded dispatch loop. Everything below runs
/// on the dedicated `LocalSet` thread, driven by a plain `select!` over the
/// three channels that can produce work — no intermediate forwarder tasks,
/// so the loop exits cleanly on an explicit `Shutdown` without depending on
/// sender reference counts that the loop itself keeps alive.
#[allow(clippy::too_many_arguments)]
async fn dispatch_loop(
    mut inbox_rx: mpsc::Receiver<Inbox>,
    mut dispatch_rx: mpsc::Receiver<DispatchRequest>,
    mut returns_rx: mpsc::Receiver<WorkItem>,
    registry: Arc<WorkflowRegistry>,
    routing: HashMap<TypeTag, mpsc::Sender<WorkItem>>,
    dispatch_tx: mpsc::Sender<DispatchRequest>,
    inbox_tx: mpsc::Sender<Inbox>,
    output_tx: mpsc::Sender<Workflow>,
) {
    let mut workflows: HashMap<WorkItemId, WorkflowMeta> = HashMap::new();
    let mut pending: HashMap<WorkItemId, u64> = HashMap::new();
    let mut barriers: HashMap<u64, Barrier> = HashMap::new();
    let mut next_barrier_id: u64 = 0;

    loop {
        let next = tokio::select! {
            msg = inbox_rx.recv() => Next::Inbox(msg),
            req = dispatch_rx.recv() => Next::Dispatch(req),
            item = returns_rx.recv() => Next::Returned(item),
        };

        match next {
            Next::Inbox(None) | Next::Dispatch(None) | Next::Returned(None) => {
                debug!("a coordinator channel closed, shutting down dispatch loop");
                break;
            }

            Next::Inbox(Some(Inbox::Shutdown)) => {
                debug!("shutdown requested, exiting dispatch loop");
                break;
            }

            Next::Inbox(Some(Inbox::Submit {
                id,
                type_tag,
                args,
                root,
            })) => {
                spawn_workflow(
                    id,
                    type_tag,
                    args,
                    root,
                    &registry,
                    &dispatch_tx,
                    &inbox_tx,
                    &mut workflows,
                );
            }

            Next::Inbox(Some(Inbox::WorkflowDone { id, outcome })) => {
                let Some(meta) = workflows.remove(&id) else {
                    warn!(workflow_id = %id, "WorkflowDone for an unknown workflow, ignoring");
                    continue;
                };
                let mut workflow = Workflow::pending(id, meta.type_tag, meta.args, meta.root);
                workflow.done = true;
                match outcome {
                    Ok(result) => workflow.result = result,
                    Err(e) => workflow.error = Some(e),
                }
                if workflow.root {
                    debug!(workflow_id = %id, "root workflow finished, delivering to embedder");
                    if output_tx.send(workflow).await.is_err() {
                        warn!(workflow_id = %id, "output queue closed, dropping finished root");
                    }
                } else {
                    debug!(workflow_id = %id, "sub-workflow finished, reinjecting as a return");
                    let sub_outcome = match &workflow.error {
                        Some(e) => Err(e.clone()),
                        None => Ok(YieldOutcome::Workflow(workflow.result.unwrap_or(Value::Null))),
                    };
                    complete_pending(id, sub_outcome, &mut pending, &mut barriers);
                }
            }

            Next::Dispatch(Some(req)) => {
                handle_dispatch(
                    req,
                    &registry,
                    &routing,
                    &dispatch_tx,
                    &inbox_tx,
                    &mut workflows,
                    &mut pending,
                    &mut barriers,
                    &mut next_barrier_id,
                );
            }

            Next::Returned(Some(item)) => {
                complete_pending(item.id, item.into_result_outcome(), &mut pending, &mut barriers);
            }
        }
    }
}

/// Disambiguates which of the three `select!`-raced channels produced a
/// value this iteration.
enum Next {
    Inbox(Option<Inbox>),
    Dispatch(Option<DispatchRequest>),
    Returned(Option<WorkItem>),
}

/// Instantiates a workflow's procedure and spawns it on the current
/// `LocalSet`. An unregistered type is a `RoutingError`: the workflow still
/// gets a `WorkflowMeta` entry and completes (in error) through the normal
/// `WorkflowDone` path, so root and non-root submissions share one
/// completion route regardless of how they fail.
fn spawn_workflow(
    id: WorkItemId,
    type_tag: TypeTag,
    args: Value,
    root: bool,
    registry: &Arc<WorkflowRegistry>,
    dispatch_tx: &mpsc::Sender<DispatchRequest>,
    inbox_tx: &mpsc::Sender<Inbox>,
    workflows: &mut HashMap<WorkItemId, WorkflowMeta>,
) {
    let ctx = YieldCtx::new(id, dispatch_tx.clone());
    workflows.insert(
        id,
        WorkflowMeta {
            type_tag,
            args: args.clone(),
            root,
        },
    );
    let inbox_tx = inbox_tx.clone();
    match registry.instantiate(type_tag, args, ctx) {
        Ok(future) => {
            tokio::task::spawn_local(async move {
                let outcome = future.await;
                let _ = inbox_tx.send(Inbox::WorkflowDone { id, outcome }).await;
            });
        }
        Err(routing_error) => {
            tokio::task::spawn_local(async move {
                let _ = inbox_tx
                    .send(Inbox::WorkflowDone {
                        id,
                        outcome: Err(routing_error),
                    })
                    .await;
            });
        }
    }
}

/// Dispatch step: constructs a Barrier for one yield and routes each
/// sub-item, or resolves an empty list/dedup-violation/routing failure
/// synchronously without ever touching a queue.
#[allow(clippy::too_many_arguments)]
fn handle_dispatch(
    req: DispatchRequest,
    registry: &Arc<WorkflowRegistry>,
    routing: &HashMap<TypeTag, mpsc::Sender<WorkItem>>,
    dispatch_tx: &mpsc::Sender<DispatchRequest>,
    inbox_tx: &mpsc::Sender<Inbox>,
    workflows: &mut HashMap<WorkItemId, WorkflowMeta>,
    pending: &mut HashMap<WorkItemId, u64>,
    barriers: &mut HashMap<u64, Barrier>,
    next_barrier_id: &mut u64,
) {
    let DispatchRequest {
        workflow_id: _,
        specs,
        was_list,
        reply,
    } = req;

    // An empty list yield resumes immediately with an empty value and
    // touches no queue.
    if specs.is_empty() {
        let _ = reply.send(Ok(Vec::new()));
        return;
    }

    // Assign every sub-item its identity up front so dedup can be checked
    // before anything is dispatched (DESIGN.md Open Question 4).
    let ids: Vec<WorkItemId> = specs
        .iter()
        .map(|spec| match spec {
            YieldSpec::Item(item) => item.id,
            YieldSpec::Workflow { .. } => WorkItemId::new(),
        })
        .collect();
    {
        let mut seen = std::collections::HashSet::with_capacity(ids.len());
        if !ids.iter().all(|id| seen.insert(*id)) {
            let _ = reply.send(Err(ErrorInfo::programmer(
                "workflow yielded the same WorkItemId twice in one fan-out",
            )));
            return;
        }
    }

    let barrier_id = *next_barrier_id;
    *next_barrier_id += 1;
    let barrier = Barrier::new(&ids, was_list, reply);
    barriers.insert(barrier_id, barrier);

    // Every id is recorded in the pending table up front, before any routing
    // failure can be discovered — `complete_pending` looks an id up in
    // `pending` to find its barrier, so a sub-item that never reaches a
    // queue (unregistered item type, unregistered sub-workflow type) still
    // needs an entry here or its failure can never be reported back to the
    // barrier and the parent hangs forever.
    for id in &ids {
        pending.insert(*id, barrier_id);
    }

    let mut immediate: Vec<(WorkItemId, Result<YieldOutcome, ErrorInfo>)> = Vec::new();

    for (id, spec) in ids.iter().copied().zip(specs.into_iter()) {
        match spec {
            YieldSpec::Item(item) => match routing.get(&item.type_tag) {
                Some(queue) => {
                    let queue = queue.clone();
                    tokio::task::spawn_local(async move {
                        let _ = queue.send(item).await;
                    });
                }
                None => {
                    immediate.push((
                        id,
                        Err(ErrorInfo::routing(format!(
                            "no worker registered for item type '{}'",
                            item.type_tag
                        ))),
                    ));
                }
            },
            YieldSpec::Workflow { type_tag, args } => {
                if registry.is_registered(type_tag) {
                    spawn_workflow(
                        id, type_tag, args, false, registry, dispatch_tx, inbox_tx, workflows,
                    );
                } else {
                    immediate.push((
                        id,
                        Err(ErrorInfo::routing(format!(
                            "workflow type '{type_tag}' is not registered"
                        ))),
                    ));
                }
            }
        }
    }

    for (id, outcome) in immediate {
        complete_pending(id, outcome, pending, barriers);
    }
}

fn complete_pending(
    id: WorkItemId,
    outcome: Result<YieldOutcome, ErrorInfo>,
    pending: &mut HashMap<WorkItemId, u64>,
    barriers: &mut HashMap<u64, Barrier>,
) {
    let Some(barrier_id) = pending.remove(&id) else {
        warn!(item_id = %id, "returning item has no pending barrier, ignoring");
        return;
    };
    let Some(barrier) = barriers.get_mut(&barrier_id) else {
        error!(item_id = %id, "pending table pointed at a missing barrier");
        return;
    };
    if barrier.finish(id, outcome) {
        let barrier = barriers.remove(&barrier_id).expect("just looked it up");
        let (reply, value) = barrier.complete();
        let _ = reply.send(value);
    }
}

impl WorkItem {
    fn into_result_outcome(self) -> Result<YieldOutcome, ErrorInfo> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(YieldOutcome::Item(self)),
        }
    }
}

