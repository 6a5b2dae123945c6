//! Core interleave library (orchestrator, providers, tools, transport, config).

pub mod client;
pub mod config;
pub mod core;
pub mod providers;
pub mod tools;
pub mod transport;
