// Sub-workflow Example - Nested Procedures
//
// Demonstrates a parent workflow yielding a sub-workflow and resuming with
// its value, one level of nesting at a time.
// Run with: cargo run --example sub_workflow -p coordinator-core

use async_trait::async_trait;
use coordinator_core::{
    Coordinator, CoordinatorConfig, ErrorInfo, WorkItem, Worker, WorkflowRegistry, YieldSpec,
};
use serde_json::json;

struct Shout;

#[async_trait]
impl Worker for Shout {
    async fn handle(&mut self, item: &mut WorkItem) -> Result<Option<WorkItem>, ErrorInfo> {
        let s = item.payload.as_str().unwrap_or_default();
        item.result = Some(json!(s.to_uppercase()));
        Ok(None)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut registry = WorkflowRegistry::new();
    registry.register(
        "shout_word",
        Box::new(|args, ctx| {
            Box::pin(async move {
                let outcome = ctx.yield_one(YieldSpec::item("shout", args)).await?;
                Ok(Some(outcome.into_value()))
            })
        }),
    );
    registry.register(
        "shout_sentence",
        Box::new(|args, ctx| {
            Box::pin(async move {
                let words = args.as_array().cloned().unwrap_or_default();
                let specs = words.into_iter().map(|w| YieldSpec::workflow("shout_word", w)).collect();
                let outcomes = ctx.yield_many(specs).await?;
                let shouted: Vec<_> = outcomes.into_iter().map(|o| o.into_value()).collect();
                Ok(Some(json!(shouted)))
            })
        }),
    );

    let mut coordinator = Coordinator::new(CoordinatorConfig::default(), registry);
    coordinator.register_worker("shout", Shout);
    coordinator.start().expect("coordinator failed to start");

    println!("Submitting [\"hello\", \"world\"] to shout_sentence...");
    coordinator
        .submit("shout_sentence", json!(["hello", "world"]))
        .await
        .unwrap();
    let workflow = coordinator.wait_until_done().await.expect("workflow failed");
    println!("Result: {:?}", workflow.result);

    coordinator.join().await.unwrap();
}
