//! Coordinator-level errors — distinct from [`crate::item::ErrorInfo`], which
//! is the error carried *inside* a workflow's result. These are raised by the
//! fleet-management API itself (calling into a stopped or unstarted
//! coordinator). An unregistered workflow type is not one of these — it
//! surfaces as a `RoutingError`-kind `ErrorInfo` on the submitted workflow
//! itself (see `workflow::WorkflowRegistry::instantiate`), consistent with
//! every other routing failure.

use thiserror::Error;

use crate::item::ErrorInfo;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordinator has been stopped")]
    Shutdown,

    #[error("coordinator has not been started")]
    NotStarted,

    #[error(transparent)]
    Item(#[from] ErrorInfo),
}
