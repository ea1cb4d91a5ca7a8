use crate::dsl::WorkflowDef;
use crate::overlay::ExecutionRecord;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;

// --- Interfaces ---

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// `version: None` means the latest stored version.
    async fn fetch(&self, name: &str, version: Option<u32>) -> Result<WorkflowDef>;
    async fn save(&self, name: &str, version: Option<u32>, definition: &WorkflowDef) -> Result<()>;
}

#[async_trait]
pub trait ExecutionFeed: Send + Sync {
    /// Every record known so far for one execution instance.
    async fn poll(&self, execution_id: &str) -> Result<Vec<ExecutionRecord>>;
}

/// The version a save goes under: explicit, else the definition's own, else 1.
pub(crate) fn save_version(version: Option<u32>, definition: &WorkflowDef) -> u32 {
    version.or(definition.version).unwrap_or(1)
}

// --- In-Memory Implementations ---

pub struct InMemoryWorkflowStore {
    // Map<Name, Map<Version, Definition>>
    definitions: DashMap<String, BTreeMap<u32, WorkflowDef>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self {
            definitions: DashMap::new(),
        }
    }

    pub fn insert(&self, definition: WorkflowDef) {
        let version = save_version(None, &definition);
        self.definitions
            .entry(definition.name.clone())
            .or_default()
            .insert(version, definition);
    }
}

impl Default for InMemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn fetch(&self, name: &str, version: Option<u32>) -> Result<WorkflowDef> {
        let versions = self
            .definitions
            .get(name)
            .ok_or_else(|| anyhow!("Workflow not found: {}", name))?;
        let found = match version {
            Some(v) => versions.get(&v),
            None => versions.values().next_back(),
        };
        found
            .cloned()
            .ok_or_else(|| anyhow!("Workflow {} has no version {:?}", name, version))
    }

    async fn save(&self, name: &str, version: Option<u32>, definition: &WorkflowDef) -> Result<()> {
        let version = save_version(version, definition);
        self.definitions
            .entry(name.to_string())
            .or_default()
            .insert(version, definition.clone());
        Ok(())
    }
}

pub struct InMemoryExecutionFeed {
    // Map<ExecutionID, Records>
    records: DashMap<String, Vec<ExecutionRecord>>,
}

impl InMemoryExecutionFeed {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn push(&self, execution_id: &str, record: ExecutionRecord) {
        self.records
            .entry(execution_id.to_string())
            .or_default()
            .push(record);
    }
}

impl Default for InMemoryExecutionFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionFeed for InMemoryExecutionFeed {
    async fn poll(&self, execution_id: &str) -> Result<Vec<ExecutionRecord>> {
        Ok(self
            .records
            .get(execution_id)
            .map(|records| records.value().clone())
            .unwrap_or_default())
    }
}
