//! # Tandem Agent
//!
//! The agentic loop controller: truncates history to the model's
//! context window, streams one model turn at a time, executes tool
//! calls through the registry, and loops until the model produces a
//! final text answer or the iteration budget runs out.

pub mod context;
pub mod loop_runner;
pub mod retry;
pub mod stream_event;

pub use context::{TruncateOptions, TruncationReport, truncate};
pub use loop_runner::ChatLoop;
pub use retry::RetryPolicy;
pub use stream_event::ChatEvent;
