//! Plan file loading
//!
//! Plans are JSON or YAML documents with `title`, `description`, `metadata`
//! and `steps`. The extension picks the parser; unknown extensions try JSON
//! first and fall back to YAML.

use anyhow::{Context, Result};
use relay_workflows::PlanRequest;
use std::path::Path;

pub async fn load_plan(path: &Path) -> Result<PlanRequest> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;
    parse_plan(&raw, path)
}

fn parse_plan(raw: &str, path: &Path) -> Result<PlanRequest> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("json") => serde_json::from_str(raw)
            .with_context(|| format!("Invalid JSON plan in {}", path.display())),
        Some("yaml") | Some("yml") => serde_yaml::from_str(raw)
            .with_context(|| format!("Invalid YAML plan in {}", path.display())),
        _ => match serde_json::from_str(raw) {
            Ok(plan) => Ok(plan),
            Err(_) => serde_yaml::from_str(raw)
                .with_context(|| format!("{} is neither a JSON nor a YAML plan", path.display())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_plan(suffix: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_loads_yaml_plan() {
        let file = write_plan(
            ".yaml",
            r#"
title: Add up
steps:
  - id: calc
    tool: compute
    action: sum
    timeout_ms: 1500
    params:
      values: [40, 2]
  - tool: echo
    action: run
    params:
      text: "<ref calc.total>"
    dependencies: [calc]
"#,
        );

        let plan = load_plan(file.path()).await.unwrap();
        assert_eq!(plan.title, "Add up");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].tool_name, "compute");
        assert_eq!(plan.steps[0].timeout_ms, Some(1500));
        assert_eq!(plan.steps[1].timeout_ms, None);
        assert_eq!(plan.steps[1].dependencies, vec!["calc".to_string()]);
    }

    #[tokio::test]
    async fn test_loads_json_plan_without_extension_hint() {
        let file = write_plan(
            ".plan",
            r#"{"title": "t", "steps": [{"tool_name": "echo", "action_name": "run"}]}"#,
        );

        let plan = load_plan(file.path()).await.unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert!(plan.steps[0].critical);
    }

    #[tokio::test]
    async fn test_reports_bad_plan() {
        let file = write_plan(".json", "{not json");
        let err = load_plan(file.path()).await.unwrap_err();
        assert!(err.to_string().contains("Invalid JSON plan"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        assert!(load_plan(Path::new("/nonexistent/relay/plan.json"))
            .await
            .is_err());
    }
}
