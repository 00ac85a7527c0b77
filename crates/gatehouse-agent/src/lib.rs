pub mod api;
pub mod config;
pub mod orchestrator;
pub mod run;
pub mod stream;
