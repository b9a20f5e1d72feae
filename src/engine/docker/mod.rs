//! Bollard-backed [`EngineAdapter`] implementation, split leaf-first the way
//! the teacher splits its Docker environment: container lifecycle, power
//! operations, and file/stats I/O each get their own file instead of one
//! god-impl.

mod container;
mod io;
mod power;
mod stats;

use async_trait::async_trait;
use bollard::Docker;

use crate::engine::traits::{EngineAdapter, EngineError, EngineResult};
use crate::engine::types::{ContainerHandle, ContainerSpec, ContainerStats, ExecOutput, ExecRequest, OutputCaps};

/// Production engine adapter, backed by a local Docker-compatible daemon.
pub struct BollardEngine {
    client: Docker,
    caps: OutputCaps,
}

impl BollardEngine {
    /// Connect using the platform-default local socket (`DOCKER_HOST` env
    /// var, or the usual unix/npipe default).
    pub fn connect() -> EngineResult<Self> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            caps: OutputCaps::default(),
        })
    }

    pub fn with_caps(mut self, caps: OutputCaps) -> Self {
        self.caps = caps;
        self
    }

    pub(crate) fn client(&self) -> &Docker {
        &self.client
    }
}

#[async_trait]
impl EngineAdapter for BollardEngine {
    async fn ping(&self) -> bool {
        self.client.ping().await.is_ok()
    }

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<ContainerHandle> {
        container::create_container(self, spec).await
    }

    async fn start(&self, handle: &ContainerHandle) -> EngineResult<()> {
        power::start(self, handle).await
    }

    async fn stop(&self, handle: &ContainerHandle) -> EngineResult<()> {
        power::stop(self, handle).await
    }

    async fn pause(&self, handle: &ContainerHandle) -> EngineResult<()> {
        power::pause(self, handle).await
    }

    async fn unpause(&self, handle: &ContainerHandle) -> EngineResult<()> {
        power::unpause(self, handle).await
    }

    async fn remove(&self, handle: &ContainerHandle, force: bool) -> EngineResult<()> {
        container::remove_container(self, handle, force).await
    }

    async fn exec(&self, handle: &ContainerHandle, req: ExecRequest) -> EngineResult<ExecOutput> {
        power::exec(self, handle, req, self.caps).await
    }

    async fn put_file(&self, handle: &ContainerHandle, path: &str, bytes: Vec<u8>) -> EngineResult<()> {
        io::put_file(self, handle, path, bytes).await
    }

    async fn get_file(&self, handle: &ContainerHandle, path: &str) -> EngineResult<Vec<u8>> {
        io::get_file(self, handle, path).await
    }

    async fn commit_image(&self, handle: &ContainerHandle, tag: &str) -> EngineResult<()> {
        io::commit_image(self, handle, tag).await
    }

    async fn list_images(&self) -> EngineResult<Vec<(String, i64)>> {
        io::list_images(self).await
    }

    async fn remove_image(&self, tag: &str, force: bool) -> EngineResult<()> {
        io::remove_image(self, tag, force).await
    }

    async fn stats(&self, handle: &ContainerHandle) -> EngineResult<ContainerStats> {
        stats::stats(self, handle).await
    }
}
