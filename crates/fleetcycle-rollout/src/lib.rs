//! fleetcycle-rollout — rolling image replacement for scaling groups.
//!
//! Replaces every instance in a scaling group with one launched from a
//! new machine image, one instance at a time. At most one instance is
//! unavailable at any moment, and the group's steady-state size is
//! restored before the next instance is touched.
//!
//! # Components
//!
//! - **`controller`** — the replacement state machine (grow, await
//!   registration, shrink, await health, confirm termination)
//! - **`template`** — launch template cloning with run-scoped names
//! - **`poll`** — bounded polling with backoff and cancellation
//! - **`verify`** — post-run per-instance report
//! - **`error`** — the run error taxonomy

pub mod controller;
pub mod error;
pub mod poll;
pub mod template;
pub mod verify;

pub use controller::{ReplaceConfig, ReplaceOutcome, ReplacePhase, Replacement};
pub use error::{ReplaceError, ReplaceResult};
pub use poll::{PollError, PollPolicy, poll_until};
pub use template::{TemplateNamer, prepare_template};
pub use verify::{VerifyEntry, VerifyReport, verify_group};
