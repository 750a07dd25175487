//! Tool registry
//!
//! Name-keyed table of tools the dispatcher routes to. Each entry carries a
//! definition derived from the tool at registration time, so dispatch-time
//! checks (actions, required params) never call back into the tool.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::tool::BoxedTool;

/// What the registry knows about a tool without invoking it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub category: String,
    pub tags: Vec<String>,
    /// Accepted action names; empty accepts any
    #[serde(default)]
    pub actions: Vec<String>,
}

impl ToolDefinition {
    fn of(tool: &BoxedTool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
            category: tool.category().to_string(),
            tags: tool.tags(),
            actions: tool.actions(),
        }
    }

    /// Parameter names the input schema marks as required
    pub fn required_params(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn supports_action(&self, action: &str) -> bool {
        self.actions.is_empty() || self.actions.iter().any(|a| a == action)
    }
}

/// Lookup counters, reported by the service after a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    pub registered: usize,
    pub lookups: u64,
    pub misses: u64,
    pub lookups_by_tool: HashMap<String, u64>,
}

pub struct ToolRegistry {
    tools: RwLock<HashMap<String, (BoxedTool, ToolDefinition)>>,
    stats: RwLock<RegistryStats>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            stats: RwLock::new(RegistryStats::default()),
        }
    }

    /// Register a tool under its own name, replacing any previous holder
    pub async fn register_tool(&self, tool: BoxedTool) -> Result<()> {
        let name = tool.name().trim().to_string();
        if name.is_empty() {
            bail!("Tool name must not be empty");
        }
        let definition = ToolDefinition::of(&tool);

        let replaced = self
            .tools
            .write()
            .await
            .insert(name.clone(), (tool, definition))
            .is_some();
        self.stats.write().await.registered = self.tools.read().await.len();

        debug!(tool = %name, replaced, "Registered tool");
        Ok(())
    }

    /// Resolve a tool for dispatch, counting the lookup
    pub async fn get(&self, name: &str) -> Option<(BoxedTool, ToolDefinition)> {
        let found = self.tools.read().await.get(name).cloned();

        let mut stats = self.stats.write().await;
        stats.lookups += 1;
        match &found {
            Some(_) => *stats.lookups_by_tool.entry(name.to_string()).or_insert(0) += 1,
            None => stats.misses += 1,
        }
        found
    }

    /// All definitions, sorted by name
    pub async fn list(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<_> = self
            .tools
            .read()
            .await
            .values()
            .map(|(_, d)| d.clone())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub async fn stats(&self) -> RegistryStats {
        self.stats.read().await.clone()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
