//! clearance-router - compliance-aware dispatch for hosted LLM backends
//!
//! Classifies each request for sensitivity markings, selects a model within
//! the monthly budget, routes sensitive content only to compliance-authorized
//! backends with failover, tracks backend health with a circuit breaker, and
//! always answers with a well-formed envelope.

pub mod backends;
pub mod classification;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod orchestrator;
pub mod routing;
pub mod store;
pub mod telemetry;
