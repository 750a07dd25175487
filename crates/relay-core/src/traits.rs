//! Core traits for relay

use async_trait::async_trait;

use crate::{ToolCall, ToolResult};

/// Uniform contract for invoking a tool action.
///
/// Implementations must be safe for concurrent calls from different
/// workflows. Failures are reported through `ToolResult::success == false`,
/// never as a panic or a Rust error.
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    async fn invoke(&self, call: ToolCall) -> ToolResult;
}
