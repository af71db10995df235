//! Observability subsystem for the shard core
//!
//! Per OBSERVABILITY.md, this module provides:
//! - Structured logging (JSON, one line per event)
//! - Deterministic metrics (monotonic counters only)
//! - Typed lifecycle events
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. No async or background threads
//! 4. Deterministic output

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
