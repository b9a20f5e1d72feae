//! The Engine Adapter: a narrow async abstraction over a Docker-compatible
//! container runtime. Production code talks to it through [`BollardEngine`];
//! tests talk to it through `MockEngine` so pool/session/cache logic runs
//! without a live daemon.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{ContainerHandle, ContainerSpec, ContainerStats, ExecOutput, ExecRequest};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine transport error: {0}")]
    Transport(String),

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("exec timed out")]
    Timeout,

    #[error("resource limit hit: {0}")]
    ResourceLimit(String),

    #[error("i/o error: {0}")]
    Io(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Narrow interface over the container runtime. Every method that the spec
/// calls "idempotent" collapses the engine's "already started"/"already
/// stopped"/"not running" responses to `Ok(())` at the implementation,
/// never at the call site.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    async fn ping(&self) -> bool;

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<ContainerHandle>;

    async fn start(&self, handle: &ContainerHandle) -> EngineResult<()>;
    async fn stop(&self, handle: &ContainerHandle) -> EngineResult<()>;
    async fn pause(&self, handle: &ContainerHandle) -> EngineResult<()>;
    async fn unpause(&self, handle: &ContainerHandle) -> EngineResult<()>;
    async fn remove(&self, handle: &ContainerHandle, force: bool) -> EngineResult<()>;

    async fn exec(&self, handle: &ContainerHandle, req: ExecRequest) -> EngineResult<ExecOutput>;

    async fn put_file(&self, handle: &ContainerHandle, path: &str, bytes: Vec<u8>) -> EngineResult<()>;
    async fn get_file(&self, handle: &ContainerHandle, path: &str) -> EngineResult<Vec<u8>>;

    async fn commit_image(&self, handle: &ContainerHandle, tag: &str) -> EngineResult<()>;

    /// List images as `(tag, created)` pairs, `created` a Unix timestamp in
    /// seconds, so callers can order by actual creation time rather than tag
    /// string.
    async fn list_images(&self) -> EngineResult<Vec<(String, i64)>>;
    async fn image_exists(&self, tag: &str) -> EngineResult<bool> {
        Ok(self.list_images().await?.iter().any(|(t, _)| t == tag))
    }
    async fn remove_image(&self, tag: &str, force: bool) -> EngineResult<()>;

    async fn stats(&self, handle: &ContainerHandle) -> EngineResult<ContainerStats>;
}
