// ===============================
// src/lib.rs
// ===============================
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod orders;   // order aggregator (volume + window validity)
pub mod ratings;  // rating lookup
pub mod render;
pub mod report;   // orchestrator: reconciliation + streamed CSV
pub mod server;
pub mod upstream; // HTTP/in-process sources
