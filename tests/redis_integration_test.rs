use flowtree::dsl::builder::WorkflowBuilder;
use flowtree::dsl::TaskDef;
use flowtree::overlay::{ExecutionRecord, ExecutionStatus};
use flowtree::runtime::redis_storage::{RedisExecutionFeed, RedisWorkflowStore};
use flowtree::runtime::storage::{ExecutionFeed, WorkflowStore};
use redis::Client;

fn get_redis_client() -> Client {
    let url = std::env::var("FLOWTREE_REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/6".to_string());
    redis::Client::open(url).expect("Invalid Redis URL")
}

async fn flush(client: &Client) {
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("Failed to connect to Redis");
    let _: () = redis::cmd("FLUSHDB")
        .query_async(&mut conn)
        .await
        .expect("Failed to flush db");
}

#[tokio::test]
#[ignore] // Ignored by default, run explicitly if redis is available
async fn test_redis_workflow_store() {
    let client = get_redis_client();
    flush(&client).await;

    let store = RedisWorkflowStore::new(client, "flowtree:test".to_string());

    let v1 = WorkflowBuilder::new("orders")
        .version(1)
        .task("A", "a").build()
        .build();
    let v2 = WorkflowBuilder::new("orders")
        .version(2)
        .task("A", "a").build()
        .do_while("loop", "true", vec![TaskDef::simple("B", "b")])
        .build();

    store.save("orders", None, &v1).await.expect("Failed to save v1");
    store.save("orders", None, &v2).await.expect("Failed to save v2");

    let latest = store.fetch("orders", None).await.expect("Failed to fetch latest");
    assert_eq!(latest, v2);
    let first = store.fetch("orders", Some(1)).await.expect("Failed to fetch v1");
    assert_eq!(first, v1);

    assert!(store.fetch("orders", Some(9)).await.is_err());
    assert!(store.fetch("missing", None).await.is_err());
}

#[tokio::test]
#[ignore]
async fn test_redis_execution_feed() {
    let client = get_redis_client();
    flush(&client).await;

    let feed = RedisExecutionFeed::new(client.clone(), "flowtree:test".to_string());
    feed.push("exec-1", &ExecutionRecord::new("A", 0, ExecutionStatus::Completed).timed(1, Some(2)))
        .await
        .expect("Failed to push");
    feed.push("exec-1", &ExecutionRecord::new("B", 1, ExecutionStatus::Running))
        .await
        .expect("Failed to push");

    // A foreign writer left garbage behind.
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("Failed to connect to Redis");
    let _: () = redis::cmd("RPUSH")
        .arg("flowtree:test:exec:exec-1:records")
        .arg("not json")
        .query_async(&mut conn)
        .await
        .expect("Failed to push garbage");

    let records = feed.poll("exec-1").await.expect("Failed to poll");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].node_id, "A");
    assert_eq!(records[1].status, ExecutionStatus::Running);

    assert!(feed.poll("exec-2").await.expect("Failed to poll").is_empty());
}
