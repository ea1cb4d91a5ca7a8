use crate::dsl::TaskDef;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// What the tool catalog knows about one task name. Display only; nothing is
/// validated against it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_keys: Vec<String>,
    #[serde(default)]
    pub output_keys: Vec<String>,
}

pub trait TaskCatalog: Send + Sync {
    fn lookup(&self, name: &str) -> Option<&TaskMetadata>;
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tasks: Vec<TaskMetadata>,
}

/// A catalog read once from YAML:
///
/// ```yaml
/// tasks:
///   - name: send_email
///     displayName: Send email
///     inputKeys: [to, subject]
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tasks: HashMap<String, TaskMetadata>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(content).context("Failed to parse task catalog")?;
        let mut catalog = Self::new();
        for task in file.tasks {
            catalog.insert(task);
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read task catalog {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn insert(&mut self, metadata: TaskMetadata) {
        self.tasks.insert(metadata.name.clone(), metadata);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// A Simple task for `name` with an `inputParameters` skeleton holding
    /// one null entry per known input.
    pub fn template(&self, reference: &str, name: &str) -> TaskDef {
        let task = TaskDef::simple(reference, name);
        match self.tasks.get(name) {
            Some(metadata) if !metadata.input_keys.is_empty() => {
                let params: Map<String, Value> = metadata
                    .input_keys
                    .iter()
                    .map(|key| (key.clone(), Value::Null))
                    .collect();
                task.with("inputParameters", Value::Object(params))
            }
            _ => task,
        }
    }
}

impl TaskCatalog for StaticCatalog {
    fn lookup(&self, name: &str) -> Option<&TaskMetadata> {
        self.tasks.get(name)
    }
}
