// Fan-out/Fan-in Example - Parallel Leaf Items, One Failure
//
// Demonstrates a workflow that yields a list of items to a single worker
// type and waits for all of them before resuming, including the
// wait-all-then-resume behavior when one of the siblings fails.
// Run with: cargo run --example fan_out -p coordinator-core

use async_trait::async_trait;
use coordinator_core::{
    Coordinator, CoordinatorConfig, ErrorInfo, WorkItem, Worker, WorkflowRegistry, YieldSpec,
};
use serde_json::{json, Value};

struct Doubler;

#[async_trait]
impl Worker for Doubler {
    async fn handle(&mut self, item: &mut WorkItem) -> Result<Option<WorkItem>, ErrorInfo> {
        let n = item.payload.as_i64().ok_or_else(|| ErrorInfo::handler("expected an integer"))?;
        if n == 13 {
            return Err(ErrorInfo::handler("13 is unlucky"));
        }
        item.result = Some(json!(n * 2));
        Ok(None)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut registry = WorkflowRegistry::new();
    registry.register(
        "double_all",
        Box::new(|args, ctx| {
            Box::pin(async move {
                let values = args.as_array().cloned().unwrap_or_default();
                let specs: Vec<_> = values.into_iter().map(|v| YieldSpec::item("double", v)).collect();
                let outcomes = ctx.yield_many(specs).await?;
                let doubled: Vec<Value> = outcomes.into_iter().map(|o| o.into_value()).collect();
                Ok(Some(json!(doubled)))
            })
        }),
    );

    let mut coordinator = Coordinator::new(CoordinatorConfig::default(), registry);
    coordinator.register_worker("double", Doubler);
    coordinator.start().expect("coordinator failed to start");

    println!("Submitting [1, 2, 3] for doubling...");
    coordinator.submit("double_all", json!([1, 2, 3])).await.unwrap();
    let workflow = coordinator.wait_until_done().await.expect("workflow failed");
    println!("Result: {:?}\n", workflow.result);

    println!("Submitting [1, 13, 3] — one sibling will fail...");
    coordinator.submit("double_all", json!([1, 13, 3])).await.unwrap();
    match coordinator.wait_until_done().await {
        Ok(workflow) => println!("Unexpected success: {:?}", workflow.result),
        Err(e) => println!("Workflow failed as expected, after waiting for every sibling: {e}"),
    }

    coordinator.join().await.unwrap();
}
