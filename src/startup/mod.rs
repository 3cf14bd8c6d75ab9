//! Bootstrap stages and the pipeline that runs them.
//!
//! - `ready`: poll the control API until it answers
//! - `launch`: load the primary model, falling back once
//! - `ensure`: run readiness, artifact sync and launch in order
//!
//! Every stage is fail-fast: the first error ends the run with an exit code
//! that identifies the stage.

mod ensure;
mod launch;
mod ready;
#[cfg(test)]
mod tests;

pub use ensure::{Bootstrap, BootstrapOutcome};
pub use launch::ModelLauncher;
pub use ready::{wait_until_ready, ReadinessProbe};
