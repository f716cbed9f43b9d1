// src/lib.rs
pub mod client;
pub mod config;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod store;
