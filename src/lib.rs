// Process configuration
pub mod config;

// Entity projections and label filtering
pub mod entity;

// Dedup cache
pub mod cache;

// Per-id cancellation
pub mod cancel;

// Event model, translation, and listener
pub mod event;

// Metrics sink
pub mod metrics;

// Outbound HTTP notifier and distributor
pub mod notify;

// Orchestrator seam and Docker adapter
pub mod orchestrator;

// Top-level wiring (C8)
pub mod swarm;

// Admin HTTP surface
pub mod api;
