//! Core types and utilities for relay
//!
//! # Modules
//!
//! - `config`: Environment configuration loading
//! - `error`: Error types and Result alias
//! - `traits`: The tool dispatch contract the engine calls through
//! - `types`: Tool call and tool result wire types

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use traits::ToolDispatch;
pub use types::*;
