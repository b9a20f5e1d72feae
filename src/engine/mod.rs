//! The Engine Adapter layer: a Docker-shaped abstraction the rest of the
//! crate talks to, plus the production and test implementations of it.

pub mod docker;
mod mock;
pub mod traits;
pub mod types;

pub use docker::BollardEngine;
#[cfg(test)]
pub use mock::MockEngine;
pub use traits::{EngineAdapter, EngineError, EngineResult};
pub use types::{
    ContainerHandle, ContainerSpec, ContainerStats, ExecOutput, ExecRequest, HardeningDescriptor,
    NetworkMode, OutputCaps, SeccompProfile, VolumeBind, TRUNCATION_MARKER,
};
