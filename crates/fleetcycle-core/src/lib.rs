//! fleetcycle-core — shared types for the rolling-replacement controller.
//!
//! Domain types describing scaling groups, launch templates, and
//! instances as observed through a fleet provider, plus the provider
//! error taxonomy and the `fleetcycle.toml` config parser.

pub mod config;
pub mod error;
pub mod types;

pub use config::CycleConfig;
pub use error::{FleetError, FleetResult};
pub use types::*;
