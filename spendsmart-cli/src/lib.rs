//! spendsmart-cli library surface: configuration loading and the pipeline
//! orchestrator, kept out of main.rs so integration tests can drive them.

pub mod config;
pub mod pipeline;
