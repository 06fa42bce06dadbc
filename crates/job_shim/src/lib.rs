//! Pod lifecycle driver for the data-pipeline worker shim.
//!
//! A pod claims one chunk of work from the control plane, mounts its
//! versioned inputs under `/pfs`, runs the user command, heartbeats while it
//! runs, and reports a terminal status exactly once, including when the
//! shim itself crashes.

pub mod control;
pub mod lifecycle;
pub mod mount;
pub mod tracing;

pub use control::{ControlPlane, GrpcControlPlane};
pub use lifecycle::{PodLifecycle, ShimError};
pub use mount::{FuseMounter, Mounter};
