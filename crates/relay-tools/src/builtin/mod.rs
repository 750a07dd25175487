//! Built-in Tools
//!
//! A small set of self-contained tools, enough to drive plans end to end
//! without any external back-end.
//!
//! ## Tools
//!
//! - **echo**: returns its parameters unchanged
//! - **display**: forwards a `content` payload for presentation
//! - **fail**: always fails, useful for exercising failure policy
//! - **compute**: numeric aggregation (`sum`, `product`, `count`)
//! - **ask_user**: poses a question with options, supports clarification

mod basic;
mod clarification;
mod compute;

pub use basic::{DisplayTool, EchoTool, FailTool};
pub use clarification::AskUserTool;
pub use compute::ComputeTool;

use crate::tool::BoxedTool;
use std::sync::Arc;

/// Create all built-in tools
pub fn create_builtin_tools() -> Vec<BoxedTool> {
    vec![
        Arc::new(EchoTool),
        Arc::new(DisplayTool),
        Arc::new(FailTool),
        Arc::new(ComputeTool),
        Arc::new(AskUserTool),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolRegistry;

    #[tokio::test]
    async fn test_builtin_names_are_unique() {
        let registry = ToolRegistry::new();
        crate::register_builtin_tools(&registry).await.unwrap();

        let names: Vec<_> = registry.list().await.into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["ask_user", "compute", "display", "echo", "fail"]);
    }
}
