//! C1 — WorkItem: the request/response envelope exchanged between the
//! Coordinator and Workers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Discriminates registered item types for routing purposes. A `'static`
/// string rather than an enum so authors can register their own types
/// without a central enum the coordinator crate would have to know about.
pub type TypeTag = &'static str;

/// Identity of a WorkItem, suitable as a pending-table key. UUIDv7 so ids
/// sort by creation order, matching the workspace's ID convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItemId(pub Uuid);

impl WorkItemId {
    pub fn new() -> Self {
        WorkItemId(Uuid::now_v7())
    }
}

impl Default for WorkItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four recognized error kinds. `Procedure` is the catch-all for
/// uncaught errors that don't already carry a more specific origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Handler,
    Procedure,
    Routing,
    Programmer,
}

/// The error triple: kind, message, and an origin trace (here, the
/// `file:line` the error was constructed at, captured via `#[track_caller]`
/// rather than a full backtrace dependency).
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub origin_trace: String,
}

impl ErrorInfo {
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            origin_trace: format!("{}:{}", loc.file(), loc.line()),
        }
    }

    #[track_caller]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Handler, message)
    }

    #[track_caller]
    pub fn procedure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Procedure, message)
    }

    #[track_caller]
    pub fn routing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Routing, message)
    }

    #[track_caller]
    pub fn programmer(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Programmer, message)
    }
}

impl From<serde_json::Error> for ErrorInfo {
    #[track_caller]
    fn from(e: serde_json::Error) -> Self {
        ErrorInfo::procedure(e.to_string())
    }
}

impl From<anyhow::Error> for ErrorInfo {
    #[track_caller]
    fn from(e: anyhow::Error) -> Self {
        ErrorInfo::procedure(format!("{e:#}"))
    }
}

/// A unit of work and its result/error envelope.
///
/// Invariant: after a Worker returns a WorkItem to the Coordinator, exactly
/// one of `{result, error}` is meaningful; before that point, both are
/// absent. This crate does not enforce the invariant with a typestate (it
/// would force every caller through a generic parameter for little benefit
/// at this scale) — callers are expected to only set one of the two fields.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub type_tag: TypeTag,
    pub payload: Value,
    pub result: Option<Value>,
    pub error: Option<ErrorInfo>,
}

impl WorkItem {
    pub fn new(type_tag: TypeTag, payload: Value) -> Self {
        Self::with_id(WorkItemId::new(), type_tag, payload)
    }

    pub fn with_id(id: WorkItemId, type_tag: TypeTag, payload: Value) -> Self {
        Self {
            id,
            type_tag,
            payload,
            result: None,
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    /// Raises the stored error if present; a no-op otherwise.
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
