//! Shared domain types for taskflow.
//!
//! This crate contains the data types used across the taskflow workspace:
//! flow lifecycle state, lifecycle events, the shared parameter store, pause
//! requests and flow configuration.
//!
//! Zero runtime dependencies -- only serde, uuid, chrono, thiserror, toml.

pub mod config;
pub mod error;
pub mod event;
pub mod params;
pub mod pause;
pub mod state;

pub use config::FlowConfig;
pub use error::{ConfigError, ParamsError};
pub use event::FlowEvent;
pub use params::TaskParams;
pub use pause::PauseRequest;
pub use state::{FlowProgress, FlowState};
