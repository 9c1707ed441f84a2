//! Context-window management.
//!
//! Before every model call the loop shrinks history to the target
//! model's context limit. The truncator never errors and never drops
//! the most recent user turn; a history that still exceeds budget is
//! sent anyway and the overflow handled at the backend boundary.

mod truncator;

pub use truncator::{TruncateOptions, TruncationReport, truncate};
