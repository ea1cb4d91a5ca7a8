use crate::dsl::WorkflowDef;
use crate::overlay::ExecutionRecord;
use crate::runtime::storage::{ExecutionFeed, WorkflowStore, save_version};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::warn;

/// Definitions as JSON strings in one hash per workflow, keyed by version.
pub struct RedisWorkflowStore {
    client: redis::Client,
    prefix: String,
}

impl RedisWorkflowStore {
    pub fn new(client: redis::Client, prefix: String) -> Self {
        Self { client, prefix }
    }

    fn workflow_key(&self, name: &str) -> String {
        format!("{}:wf:{}", self.prefix, name)
    }
}

#[async_trait]
impl WorkflowStore for RedisWorkflowStore {
    async fn fetch(&self, name: &str, version: Option<u32>) -> Result<WorkflowDef> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = self.workflow_key(name);

        let version = match version {
            Some(v) => v,
            None => {
                let versions: Vec<String> = conn.hkeys(&key).await?;
                versions
                    .iter()
                    .filter_map(|v| v.parse::<u32>().ok())
                    .max()
                    .ok_or_else(|| anyhow!("Workflow not found: {}", name))?
            }
        };

        let json: Option<String> = conn.hget(&key, version).await?;
        let json = json.ok_or_else(|| anyhow!("Workflow {} has no version {}", name, version))?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn save(&self, name: &str, version: Option<u32>, definition: &WorkflowDef) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let json = serde_json::to_string(definition)?;
        let _: () = conn
            .hset(self.workflow_key(name), save_version(version, definition), json)
            .await?;
        Ok(())
    }
}

/// Records appended by the engine side to one list per execution.
pub struct RedisExecutionFeed {
    client: redis::Client,
    prefix: String,
}

impl RedisExecutionFeed {
    pub fn new(client: redis::Client, prefix: String) -> Self {
        Self { client, prefix }
    }

    fn records_key(&self, execution_id: &str) -> String {
        format!("{}:exec:{}:records", self.prefix, execution_id)
    }

    pub async fn push(&self, execution_id: &str, record: &ExecutionRecord) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let json = serde_json::to_string(record)?;
        let _: () = conn.rpush(self.records_key(execution_id), json).await?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionFeed for RedisExecutionFeed {
    async fn poll(&self, execution_id: &str) -> Result<Vec<ExecutionRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Vec<String> = conn.lrange(self.records_key(execution_id), 0, -1).await?;

        let mut records = Vec::with_capacity(raw.len());
        for json in raw {
            match serde_json::from_str(&json) {
                Ok(record) => records.push(record),
                Err(e) => warn!(execution_id, error = %e, "skipping malformed execution record"),
            }
        }
        Ok(records)
    }
}
