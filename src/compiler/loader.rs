use crate::dsl::WorkflowDef;
use anyhow::{Context as AnyhowContext, Result};
use std::fs;
use std::path::Path;

/// Reads a definition from a `.json`, `.yaml` or `.yml` file.
pub fn load_workflow(path: &Path) -> Result<WorkflowDef> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let workflow: WorkflowDef = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON workflow from {}", path.display()))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML workflow from {}", path.display()))?
    };

    Ok(workflow)
}

/// Writes a definition as pretty-printed JSON.
pub fn save_workflow(path: &Path, workflow: &WorkflowDef) -> Result<()> {
    let content = serde_json::to_string_pretty(workflow)?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write workflow file {}", path.display()))?;
    Ok(())
}
