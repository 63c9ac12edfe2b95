//! Observability setup for taskflow: a `tracing` subscriber with structured
//! output and an optional OpenTelemetry bridge.

pub mod tracing_setup;

pub use tracing_setup::{init_test_tracing, init_tracing, shutdown_tracing};
