//! fleetcycle-provider — the fleet provider seam.
//!
//! The replacement controller only ever talks to a [`FleetProvider`].
//! Two implementations ship here:
//!
//! - **`HttpFleet`** — JSON over HTTP/1.1 against a fleet-management
//!   REST endpoint.
//! - **`SimFleet`** — deterministic in-memory fleet with lazy
//!   convergence, injected wherever tests need a fleet.

pub mod http;
pub mod provider;
pub mod sim;

pub use http::HttpFleet;
pub use provider::FleetProvider;
pub use sim::SimFleet;
