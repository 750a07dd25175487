//! relay-tools: Tool Registry and Dispatch
//!
//! Provides the tool registry, the dispatcher the workflow engine invokes
//! tools through, and a small set of built-in tools.

pub mod builtin;
pub mod dispatcher;
pub mod registry;
pub mod tool;

// Re-export main types
pub use dispatcher::{DispatcherConfig, ToolDispatcher};
pub use registry::{RegistryStats, ToolDefinition, ToolRegistry};
pub use tool::{BoxedTool, SimpleTool, Tool};

/// Register all built-in tools
pub async fn register_builtin_tools(registry: &ToolRegistry) -> anyhow::Result<()> {
    for tool in builtin::create_builtin_tools() {
        registry.register_tool(tool).await?;
    }
    Ok(())
}
