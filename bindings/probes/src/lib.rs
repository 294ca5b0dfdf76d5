//! Narrow adapters that answer questions about the environment a drill runs against.
//!
//! Scenarios only talk to infrastructure through the [prelude::Probes] trait. The
//! [prelude::SystemProbes] implementation shells out to the container runtime and database
//! tooling, while `ScriptedProbes` (behind the `test_utils` feature) answers from a script and
//! records every call it receives.

mod probes;
#[cfg(any(test, feature = "test_utils"))]
mod scripted;
mod system;

pub mod prelude {
    pub use crate::probes::{ProbeFuture, Probes, ProcessOutput};
    #[cfg(any(test, feature = "test_utils"))]
    pub use crate::scripted::{ProbeCall, ScriptedProbes};
    pub use crate::system::SystemProbes;
}
