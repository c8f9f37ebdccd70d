pub mod agent;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod error;
pub mod forum;
pub mod generator;
pub mod history;
pub mod http_client;
pub mod llm_client;
pub mod persona;
pub mod publisher;
pub mod rate_gate;
pub mod runtime;
pub mod transcript;
