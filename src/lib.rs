// Library crate for integration tests.
// main.rs has its own mod declarations; this re-exports all modules.

pub mod aggregate;
pub mod config;
pub mod environment;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod report;
pub mod secrets;
pub mod status;
