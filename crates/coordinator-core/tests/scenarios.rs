//! End-to-end scenarios for the dispatch loop, exercised against a real
//! `Coordinator` with a couple of small in-test `Worker` impls rather than
//! mocks.

use async_trait::async_trait;
use coordinator_core::{
    Coordinator, CoordinatorConfig, CoordinatorError, ErrorInfo, ErrorKind, WorkItem, WorkItemId,
    Worker, WorkflowRegistry, YieldSpec,
};
use serde_json::{json, Value};
use std::time::Duration;

fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        poll_interval: Duration::from_millis(20),
        channel_capacity: 16,
    }
}

struct Echo;

#[async_trait]
impl Worker for Echo {
    async fn handle(&mut self, item: &mut WorkItem) -> Result<Option<WorkItem>, ErrorInfo> {
        item.result = Some(item.payload.clone());
        Ok(None)
    }
}

struct Boom;

#[async_trait]
impl Worker for Boom {
    async fn handle(&mut self, _item: &mut WorkItem) -> Result<Option<WorkItem>, ErrorInfo> {
        Err(ErrorInfo::handler("boom"))
    }
}

/// S1 — a workflow that yields a single leaf item and returns its result.
#[tokio::test]
async fn leaf_workflow_resumes_with_the_item_result() {
    let mut registry = WorkflowRegistry::new();
    registry.register(
        "leaf",
        Box::new(|args, ctx| {
            Box::pin(async move {
                let outcome = ctx.yield_one(YieldSpec::item("echo", args)).await?;
                Ok(Some(outcome.into_value()))
            })
        }),
    );

    let mut coordinator = Coordinator::new(config(), registry);
    coordinator.register_worker("echo", Echo);
    coordinator.start().unwrap();

    coordinator.submit("leaf", json!(42)).await.unwrap();
    let workflow = coordinator.wait_until_done().await.unwrap();
    assert_eq!(workflow.result, Some(json!(42)));

    coordinator.join().await.unwrap();
}

/// S2 — fan-out/fan-in over a list of leaf items, results preserve order.
#[tokio::test]
async fn fan_out_collects_every_result_in_order() {
    let mut registry = WorkflowRegistry::new();
    registry.register(
        "fanout",
        Box::new(|args, ctx| {
            Box::pin(async move {
                let values = args.as_array().cloned().unwrap_or_default();
                let specs = values.into_iter().map(|v| YieldSpec::item("echo", v)).collect();
                let outcomes = ctx.yield_many(specs).await?;
                let results: Vec<Value> = outcomes.into_iter().map(|o| o.into_value()).collect();
                Ok(Some(json!(results)))
            })
        }),
    );

    let mut coordinator = Coordinator::new(config(), registry);
    coordinator.register_worker("echo", Echo);
    coordinator.start().unwrap();

    coordinator.submit("fanout", json!([1, 2, 3])).await.unwrap();
    let workflow = coordinator.wait_until_done().await.unwrap();
    assert_eq!(workflow.result, Some(json!([1, 2, 3])));

    coordinator.join().await.unwrap();
}

/// S3 — a workflow that yields a sub-workflow and resumes with its value,
/// never the sub-workflow record itself.
#[tokio::test]
async fn sub_workflow_unwraps_to_its_result_value() {
    let mut registry = WorkflowRegistry::new();
    registry.register(
        "child",
        Box::new(|args, ctx| {
            Box::pin(async move {
                let outcome = ctx.yield_one(YieldSpec::item("echo", args)).await?;
                Ok(Some(outcome.into_value()))
            })
        }),
    );
    registry.register(
        "parent",
        Box::new(|args, ctx| {
            Box::pin(async move {
                let outcome = ctx.yield_one(YieldSpec::workflow("child", args)).await?;
                Ok(Some(outcome.into_value()))
            })
        }),
    );

    let mut coordinator = Coordinator::new(config(), registry);
    coordinator.register_worker("echo", Echo);
    coordinator.start().unwrap();

    coordinator.submit("parent", json!("hi")).await.unwrap();
    let workflow = coordinator.wait_until_done().await.unwrap();
    assert_eq!(workflow.result, Some(json!("hi")));

    coordinator.join().await.unwrap();
}

/// S4 — an uncaught handler error surfaces on the root workflow.
#[tokio::test]
async fn handler_error_propagates_to_root_workflow() {
    let mut registry = WorkflowRegistry::new();
    registry.register(
        "faulty",
        Box::new(|args, ctx| {
            Box::pin(async move {
                let outcome = ctx.yield_one(YieldSpec::item("boom", args)).await?;
                Ok(Some(outcome.into_value()))
            })
        }),
    );

    let mut coordinator = Coordinator::new(config(), registry);
    coordinator.register_worker("boom", Boom);
    coordinator.start().unwrap();

    coordinator.submit("faulty", Value::Null).await.unwrap();
    let err = coordinator.wait_until_done().await.unwrap_err();
    match err {
        CoordinatorError::Item(info) => assert_eq!(info.kind, ErrorKind::Handler),
        other => panic!("expected an Item error, got {other:?}"),
    }

    coordinator.join().await.unwrap();
}

/// S4 — a workflow that catches the re-raised error at the yield site and
/// returns a value of its own; the error never reaches the workflow record.
#[tokio::test]
async fn caught_handler_error_does_not_fail_the_workflow() {
    let mut registry = WorkflowRegistry::new();
    registry.register(
        "resilient",
        Box::new(|args, ctx| {
            Box::pin(async move {
                match ctx.yield_one(YieldSpec::item("boom", args)).await {
                    Ok(outcome) => Ok(Some(outcome.into_value())),
                    Err(_) => Ok(Some(json!("caught"))),
                }
            })
        }),
    );

    let mut coordinator = Coordinator::new(config(), registry);
    coordinator.register_worker("boom", Boom);
    coordinator.start().unwrap();

    coordinator.submit("resilient", Value::Null).await.unwrap();
    let workflow = coordinator.wait_until_done().await.unwrap();
    assert_eq!(workflow.result, Some(json!("caught")));
    assert!(workflow.error.is_none());

    coordinator.join().await.unwrap();
}

/// S5 — fan-out where one sibling fails; the barrier still waits for every
/// sibling before resuming the parent with the first error.
#[tokio::test]
async fn fan_out_with_one_failure_waits_for_all_before_erroring() {
    let mut registry = WorkflowRegistry::new();
    registry.register(
        "mixed",
        Box::new(|_args, ctx| {
            Box::pin(async move {
                let specs = vec![
                    YieldSpec::item("echo", json!(1)),
                    YieldSpec::item("boom", Value::Null),
                    YieldSpec::item("echo", json!(3)),
                ];
                let outcomes = ctx.yield_many(specs).await?;
                let results: Vec<Value> = outcomes.into_iter().map(|o| o.into_value()).collect();
                Ok(Some(json!(results)))
            })
        }),
    );

    let mut coordinator = Coordinator::new(config(), registry);
    coordinator.register_worker("echo", Echo);
    coordinator.register_worker("boom", Boom);
    coordinator.start().unwrap();

    coordinator.submit("mixed", Value::Null).await.unwrap();
    let err = coordinator.wait_until_done().await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Item(_)));

    coordinator.join().await.unwrap();
}

/// S6 — an empty fan-out resumes immediately with no outstanding items.
#[tokio::test]
async fn empty_fan_out_resumes_immediately() {
    let mut registry = WorkflowRegistry::new();
    registry.register(
        "empty",
        Box::new(|_args, ctx| {
            Box::pin(async move {
                let outcomes = ctx.yield_many(Vec::new()).await?;
                Ok(Some(json!(outcomes.len())))
            })
        }),
    );

    let mut coordinator = Coordinator::new(config(), registry);
    coordinator.start().unwrap();

    coordinator.submit("empty", Value::Null).await.unwrap();
    let workflow = coordinator.wait_until_done().await.unwrap();
    assert_eq!(workflow.result, Some(json!(0)));

    coordinator.join().await.unwrap();
}

/// A submission naming an unregistered workflow type fails the root
/// workflow with a RoutingError instead of hanging forever.
#[tokio::test]
async fn unregistered_workflow_type_fails_fast() {
    let registry = WorkflowRegistry::new();
    let mut coordinator = Coordinator::new(config(), registry);
    coordinator.start().unwrap();

    coordinator.submit("nonexistent", Value::Null).await.unwrap();
    let err = coordinator.wait_until_done().await.unwrap_err();
    match err {
        CoordinatorError::Item(info) => assert_eq!(info.kind, ErrorKind::Routing),
        other => panic!("expected an Item error, got {other:?}"),
    }

    coordinator.join().await.unwrap();
}

/// A lone yield of an unregistered item type is a RoutingError surfaced
/// synchronously at dispatch (spec.md §3/§7) — the workflow must not hang
/// waiting on a barrier that can never complete.
#[tokio::test]
async fn lone_unregistered_item_type_fails_fast() {
    let mut registry = WorkflowRegistry::new();
    registry.register(
        "lone_unrouted",
        Box::new(|args, ctx| {
            Box::pin(async move {
                let outcome = ctx.yield_one(YieldSpec::item("no_such_worker", args)).await?;
                Ok(Some(outcome.into_value()))
            })
        }),
    );

    let mut coordinator = Coordinator::new(config(), registry);
    coordinator.start().unwrap();

    coordinator.submit("lone_unrouted", Value::Null).await.unwrap();
    let err = tokio::time::timeout(Duration::from_secs(2), coordinator.wait_until_done())
        .await
        .expect("workflow should fail promptly instead of hanging")
        .unwrap_err();
    match err {
        CoordinatorError::Item(info) => assert_eq!(info.kind, ErrorKind::Routing),
        other => panic!("expected an Item error, got {other:?}"),
    }

    coordinator.join().await.unwrap();
}

/// A fan-out containing one unregistered item type among otherwise-valid
/// siblings must still resume the parent with a RoutingError instead of
/// leaving the barrier permanently short one sibling.
#[tokio::test]
async fn fan_out_with_unregistered_item_type_fails_fast() {
    let mut registry = WorkflowRegistry::new();
    registry.register(
        "mixed_unrouted",
        Box::new(|_args, ctx| {
            Box::pin(async move {
                let specs = vec![
                    YieldSpec::item("echo", json!(1)),
                    YieldSpec::item("no_such_worker", json!(2)),
                    YieldSpec::item("echo", json!(3)),
                ];
                let outcomes = ctx.yield_many(specs).await?;
                let results: Vec<Value> = outcomes.into_iter().map(|o| o.into_value()).collect();
                Ok(Some(json!(results)))
            })
        }),
    );

    let mut coordinator = Coordinator::new(config(), registry);
    coordinator.register_worker("echo", Echo);
    coordinator.start().unwrap();

    coordinator.submit("mixed_unrouted", Value::Null).await.unwrap();
    let err = tokio::time::timeout(Duration::from_secs(2), coordinator.wait_until_done())
        .await
        .expect("workflow should fail promptly instead of hanging")
        .unwrap_err();
    match err {
        CoordinatorError::Item(info) => assert_eq!(info.kind, ErrorKind::Routing),
        other => panic!("expected an Item error, got {other:?}"),
    }

    coordinator.join().await.unwrap();
}

/// A sub-workflow yield (not a root submission) naming an unregistered
/// workflow type must also fail fast instead of hanging — this exercises
/// `handle_dispatch`'s own registration check, distinct from
/// `unregistered_workflow_type_fails_fast` above which only exercises the
/// root-submission path through `spawn_workflow`.
#[tokio::test]
async fn sub_workflow_yield_of_unregistered_type_fails_fast() {
    let mut registry = WorkflowRegistry::new();
    registry.register(
        "parent_of_missing_child",
        Box::new(|args, ctx| {
            Box::pin(async move {
                let outcome = ctx.yield_one(YieldSpec::workflow("no_such_workflow", args)).await?;
                Ok(Some(outcome.into_value()))
            })
        }),
    );

    let mut coordinator = Coordinator::new(config(), registry);
    coordinator.start().unwrap();

    coordinator.submit("parent_of_missing_child", Value::Null).await.unwrap();
    let err = tokio::time::timeout(Duration::from_secs(2), coordinator.wait_until_done())
        .await
        .expect("workflow should fail promptly instead of hanging")
        .unwrap_err();
    match err {
        CoordinatorError::Item(info) => assert_eq!(info.kind, ErrorKind::Routing),
        other => panic!("expected an Item error, got {other:?}"),
    }

    coordinator.join().await.unwrap();
}

/// Yielding the same WorkItemId twice in one fan-out is a ProgrammerError,
/// rejected before anything is dispatched to a worker (spec.md §9).
#[tokio::test]
async fn duplicate_id_in_one_fan_out_is_rejected() {
    let mut registry = WorkflowRegistry::new();
    registry.register(
        "dupe",
        Box::new(|_args, ctx| {
            Box::pin(async move {
                let id = WorkItemId::new();
                let specs = vec![
                    YieldSpec::Item(WorkItem::with_id(id, "echo", json!(1))),
                    YieldSpec::Item(WorkItem::with_id(id, "echo", json!(2))),
                ];
                let outcomes = ctx.yield_many(specs).await?;
                Ok(Some(json!(outcomes.len())))
            })
        }),
    );

    let mut coordinator = Coordinator::new(config(), registry);
    coordinator.register_worker("echo", Echo);
    coordinator.start().unwrap();

    coordinator.submit("dupe", Value::Null).await.unwrap();
    let err = coordinator.wait_until_done().await.unwrap_err();
    match err {
        CoordinatorError::Item(info) => assert_eq!(info.kind, ErrorKind::Programmer),
        other => panic!("expected an Item error, got {other:?}"),
    }

    coordinator.join().await.unwrap();
}
