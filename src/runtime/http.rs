use crate::dsl::WorkflowDef;
use crate::overlay::{ExecutionRecord, ExecutionStatus};
use crate::runtime::storage::{ExecutionFeed, WorkflowStore};
use anyhow::{Context as AnyhowContext, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

/// The engine's REST metadata API.
#[derive(Debug, Clone)]
pub struct HttpWorkflowStore {
    client: Client,
    base_url: String,
}

impl HttpWorkflowStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl WorkflowStore for HttpWorkflowStore {
    async fn fetch(&self, name: &str, version: Option<u32>) -> Result<WorkflowDef> {
        let url = format!("{}/metadata/workflow/{}", self.base_url, name);
        let mut request = self.client.get(&url);
        if let Some(version) = version {
            request = request.query(&[("version", version)]);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to fetch workflow {}", name))?;
        if !response.status().is_success() {
            return Err(anyhow!("Fetching workflow {} returned {}", name, response.status()));
        }
        let definition = response
            .json::<WorkflowDef>()
            .await
            .with_context(|| format!("Invalid workflow definition from {}", url))?;
        Ok(definition)
    }

    async fn save(&self, name: &str, version: Option<u32>, definition: &WorkflowDef) -> Result<()> {
        let mut definition = definition.clone();
        definition.name = name.to_string();
        if version.is_some() {
            definition.version = version;
        }
        // The update endpoint takes a list of definitions.
        let url = format!("{}/metadata/workflow", self.base_url);
        let response = self
            .client
            .put(&url)
            .json(&vec![definition])
            .send()
            .await
            .with_context(|| format!("Failed to save workflow {}", name))?;
        if !response.status().is_success() {
            return Err(anyhow!("Saving workflow {} returned {}", name, response.status()));
        }
        debug!(workflow = %name, ?version, "saved workflow definition");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpExecutionFeed {
    client: Client,
    base_url: String,
}

impl HttpExecutionFeed {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ExecutionFeed for HttpExecutionFeed {
    async fn poll(&self, execution_id: &str) -> Result<Vec<ExecutionRecord>> {
        let url = format!("{}/workflow/{}", self.base_url, execution_id);
        let response = self
            .client
            .get(&url)
            .query(&[("includeTasks", "true")])
            .send()
            .await
            .with_context(|| format!("Failed to poll execution {}", execution_id))?;
        if !response.status().is_success() {
            return Err(anyhow!("Polling execution {} returned {}", execution_id, response.status()));
        }
        let document: Value = response.json().await?;
        Ok(records_from_execution(&document))
    }
}

/// Maps an execution document's `tasks[]` to records.
///
/// Loop iterations come back with the iteration appended to the reference
/// name (`step__2`); that suffix is stripped so they land on the loop body's
/// node. Tasks with an unrecognised status are skipped.
pub fn records_from_execution(document: &Value) -> Vec<ExecutionRecord> {
    let Some(tasks) = document.get("tasks").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut records = Vec::with_capacity(tasks.len());
    for task in tasks {
        let Some(reference) = task.get("referenceTaskName").and_then(Value::as_str) else {
            continue;
        };
        let iteration = task
            .get("iteration")
            .and_then(Value::as_u64)
            .and_then(|i| u32::try_from(i).ok())
            .unwrap_or(0);
        let status = match task
            .get("status")
            .and_then(Value::as_str)
            .map(str::parse::<ExecutionStatus>)
        {
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                warn!(node_id = %reference, error = %e, "skipping task with unknown status");
                continue;
            }
            None => continue,
        };

        let suffix = format!("__{}", iteration);
        let node_id = match reference.strip_suffix(suffix.as_str()) {
            Some(base) if iteration > 0 => base,
            _ => reference,
        };

        records.push(ExecutionRecord {
            node_id: node_id.to_string(),
            iteration,
            status,
            start_time: timestamp(task, "startTime"),
            end_time: timestamp(task, "endTime"),
            input: task.get("inputData").cloned(),
            output: task.get("outputData").cloned(),
        });
    }
    records
}

/// The engine reports "not yet" as 0.
fn timestamp(task: &Value, field: &str) -> Option<u64> {
    task.get(field).and_then(Value::as_u64).filter(|t| *t > 0)
}
