//! Engine top level: run configuration and the run loop.

pub mod config;
#[allow(clippy::module_inception)]
pub mod engine;

pub use config::{ConfigError, ExecutionMode, FaultPolicy, RunConfig, WarmupPolicy};
pub use engine::{CancelToken, Engine, EngineError, RunSummary};
