//! # Tandem Tools
//!
//! The tool registry and the machinery around it: pluggable descriptor
//! sources, copy-on-write snapshots with hot reload, result-size
//! governance, and a handful of built-in tools.

pub mod builtin;
pub mod registry;
pub mod truncation;

pub use builtin::BuiltinSource;
pub use registry::ToolRegistry;
pub use truncation::bound_value;

use std::sync::Arc;

/// A registry preloaded with the built-in tool source.
pub fn default_registry(result_token_ceiling: usize) -> ToolRegistry {
    ToolRegistry::new(vec![Arc::new(BuiltinSource)], result_token_ceiling)
}
