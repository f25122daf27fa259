//! Typed notification events
//!
//! External dashboards and loggers observe the core through [`MeshEvent`]
//! values published on the [`EventBus`]. Every payload is a tagged variant;
//! there is no string-keyed emitter anywhere in the crate.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{BridgeStatus, HealthSnapshot, MeshEvent};
