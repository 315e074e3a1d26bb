//! C3 — Workflow procedure: the author-written suspendable routine and the
//! registry that instantiates it by type tag.
//!
//! A workflow procedure is an ordinary `async fn(args, YieldCtx) -> Result<Option<Value>, ErrorInfo>`.
//! `Ok(None)` is natural end (no result), `Ok(Some(v))` is an explicit
//! return-with-value, `Err(e)` is an uncaught error. Native `async`/`await`
//! gives all three outcomes directly (see DESIGN.md, Open Question 1) — no
//! hand-rolled generator or sentinel exception type is needed.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::item::{ErrorInfo, TypeTag, WorkItem, WorkItemId};

/// A workflow procedure's suspended computation, boxed so the registry can
/// hand back a type-erased future regardless of which concrete `async fn`
/// produced it. Not `Send`: it is only ever polled on the Coordinator's
/// single-threaded `LocalSet` (see coordinator.rs), so authors may freely
/// capture `Rc`/`RefCell` state if they want to.
pub type ProcedureFuture = Pin<Box<dyn Future<Output = Result<Option<Value>, ErrorInfo>>>>;

/// Builds a procedure future from JSON-encoded construction arguments and
/// the `YieldCtx` the procedure uses to suspend. The factory closure itself
/// must be `Send + Sync` so the registry holding it can move to the
/// coordinator's dedicated dispatch thread — only the *future it produces*
/// is pinned to that thread.
pub type WorkflowFactory = Box<dyn Fn(Value, YieldCtx) -> ProcedureFuture + Send + Sync>;

/// Factory-by-string-key table. Workflow procedures are plain functions
/// rather than trait objects, so authors register a boxed closure directly
/// instead of deriving a factory from a typed input struct.
#[derive(Default)]
pub struct WorkflowRegistry {
    factories: HashMap<TypeTag, WorkflowFactory>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a procedure under `type_tag`. Re-registering the same tag
    /// replaces the previous factory.
    pub fn register(&mut self, type_tag: TypeTag, factory: WorkflowFactory) {
        self.factories.insert(type_tag, factory);
    }

    pub fn is_registered(&self, type_tag: TypeTag) -> bool {
        self.factories.contains_key(type_tag)
    }

    /// Instantiates the procedure for `type_tag`. A `RoutingError` if no
    /// factory was registered — an unregistered type is a programming error
    /// surfaced synchronously at dispatch; there is no illustrative default
    /// procedure to fall back to (see DESIGN.md Open Question 3).
    pub(crate) fn instantiate(
        &self,
        type_tag: TypeTag,
        args: Value,
        ctx: YieldCtx,
    ) -> Result<ProcedureFuture, ErrorInfo> {
        let factory = self.factories.get(type_tag).ok_or_else(|| {
            ErrorInfo::routing(format!("workflow type '{type_tag}' is not registered"))
        })?;
        Ok(factory(args, ctx))
    }
}

/// A workflow's durable record. Built by the Coordinator at
/// submission and at completion; not mutated by the procedure itself (the
/// procedure only ever sees its `args` and its `YieldCtx`).
#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: WorkItemId,
    pub type_tag: TypeTag,
    pub args: Value,
    pub root: bool,
    pub done: bool,
    pub result: Option<Value>,
    pub error: Option<ErrorInfo>,
}

impl Workflow {
    pub(crate) fn pending(id: WorkItemId, type_tag: TypeTag, args: Value, root: bool) -> Self {
        Self {
            id,
            type_tag,
            args,
            root,
            done: false,
            result: None,
            error: None,
        }
    }

    /// Raises the stored error if present; a no-op otherwise. Called by the
    /// embedder after `wait_until_done`.
    pub fn check(&self) -> Result<(), ErrorInfo> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    pub fn into_result(self) -> Result<Option<Value>, ErrorInfo> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result),
        }
    }
}

/// One thing a workflow procedure can yield: a leaf WorkItem routed through
/// the registered worker queue, or a sub-workflow instantiated and driven
/// the same way the parent is — workflow-typed items are always routed to
/// the coordinator's own input queue, never to a registered worker.
pub enum YieldSpec {
    Item(WorkItem),
    Workflow { type_tag: TypeTag, args: Value },
}

impl YieldSpec {
    pub fn item(type_tag: TypeTag, payload: Value) -> Self {
        YieldSpec::Item(WorkItem::new(type_tag, payload))
    }

    pub fn workflow(type_tag: TypeTag, args: Value) -> Self {
        YieldSpec::Workflow { type_tag, args }
    }
}

/// What gets injected back into a resumed procedure for one yielded item:
/// the whole WorkItem for a leaf, or just the `result` value for a
/// sub-workflow (never the sub-workflow record itself).
#[derive(Debug, Clone)]
pub enum YieldOutcome {
    Item(WorkItem),
    Workflow(Value),
}

impl YieldOutcome {
    /// Convenience accessor for the common case of yielding a single leaf
    /// item and wanting its payload-shaped result.
    pub fn into_value(self) -> Value {
        match self {
            YieldOutcome::Item(item) => item.result.unwrap_or(Value::Null),
            YieldOutcome::Workflow(v) => v,
        }
    }
}

/// Message sent from a suspended procedure to the Coordinator's dispatch
/// loop, paired with a oneshot the Coordinator uses to resume it once its
/// Barrier completes.
pub(crate) struct DispatchRequest {
    pub workflow_id: WorkItemId,
    pub specs: Vec<YieldSpec>,
    pub was_list: bool,
    pub reply: oneshot::Sender<Result<Vec<YieldOutcome>, ErrorInfo>>,
}

/// Handle a running procedure uses to yield. Cheap to clone; every clone
/// shares the same channel back to the Coordinator's inbox.
#[derive(Clone)]
pub struct YieldCtx {
    workflow_id: WorkItemId,
    dispatch: mpsc::Sender<DispatchRequest>,
}

impl YieldCtx {
    pub(crate) fn new(workflow_id: WorkItemId, dispatch: mpsc::Sender<DispatchRequest>) -> Self {
        Self {
            workflow_id,
            dispatch,
        }
    }

    /// Suspends until `spec` returns.
    pub async fn yield_one(&self, spec: YieldSpec) -> Result<YieldOutcome, ErrorInfo> {
        let mut outcomes = self.yield_raw(vec![spec], false).await?;
        Ok(outcomes
            .pop()
            .expect("single-item yield always resumes with exactly one outcome"))
    }

    /// Suspends until every item in `specs` has returned (fan-out/fan-in).
    /// An empty list resumes immediately with an empty vec and touches no
    /// queue.
    pub async fn yield_many(&self, specs: Vec<YieldSpec>) -> Result<Vec<YieldOutcome>, ErrorInfo> {
        self.yield_raw(specs, true).await
    }

    async fn yield_raw(
        &self,
        specs: Vec<YieldSpec>,
        was_list: bool,
    ) -> Result<Vec<YieldOutcome>, ErrorInfo> {
        let (reply, rx) = oneshot::channel();
        self.dispatch
            .send(DispatchRequest {
                workflow_id: self.workflow_id,
                specs,
                was_list,
                reply,
            })
            .await
            .map_err(|_| ErrorInfo::programmer("coordinator inbox closed before dispatch"))?;
        rx.await
            .map_err(|_| ErrorInfo::programmer("coordinator dropped a yield without replying"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_rejects_unregistered_type() {
        let registry = WorkflowRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let ctx = YieldCtx::new(WorkItemId::new(), tx);
        let err = registry
            .instantiate("missing", Value::Null, ctx)
            .unwrap_err();
        assert_eq!(err.kind, crate::item::ErrorKind::Routing);
    }

    #[test]
    fn workflow_check_surfaces_stored_error() {
        let mut wf = Workflow::pending(WorkItemId::new(), "demo", Value::Null, true);
        wf.error = Some(ErrorInfo::procedure("boom"));
        assert!(wf.check().is_err());
    }

    #[test]
    fn yield_outcome_into_value_unwraps_item_result() {
        let mut item = WorkItem::new("echo", Value::Null);
        item.result = Some(serde_json::json!(42));
        let outcome = YieldOutcome::Item(item);
        assert_eq!(outcome.into_value(), serde_json::json!(42));
    }
}
