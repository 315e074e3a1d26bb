//! In-process workflow coordinator: suspendable workflow procedures, typed
//! worker queues, and fan-out/fan-in barriers.
//!
//! A workflow procedure is an ordinary `async fn` that suspends by calling
//! [`YieldCtx::yield_one`]/[`YieldCtx::yield_many`]. The [`Coordinator`]
//! drives every procedure to completion on a dedicated single-threaded
//! runtime, routes its yielded items to registered [`Worker`]s, and
//! resumes it once every yielded item (or nested workflow) has returned.
//!
//! ```ignore
//! let mut registry = WorkflowRegistry::new();
//! registry.register("greet", Box::new(|args, ctx| Box::pin(async move {
//!     let outcome = ctx.yield_one(YieldSpec::item("shout", args)).await?;
//!     Ok(Some(outcome.into_value()))
//! })));
//!
//! let mut coordinator = Coordinator::new(CoordinatorConfig::default(), registry);
//! coordinator.register_worker("shout", ShoutWorker);
//! coordinator.start()?;
//! coordinator.submit("greet", serde_json::json!("hi")).await?;
//! let workflow = coordinator.wait_until_done().await?;
//! ```

mod barrier;
mod config;
mod coordinator;
mod error;
mod item;
mod worker;
mod workflow;

pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use error::CoordinatorError;
pub use item::{ErrorInfo, ErrorKind, TypeTag, WorkItem, WorkItemId};
pub use worker::{Worker, WorkerLoop};
pub use workflow::{
    ProcedureFuture, Workflow, WorkflowFactory, WorkflowRegistry, YieldCtx, YieldOutcome, YieldSpec,
};
