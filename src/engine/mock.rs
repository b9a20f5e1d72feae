//! An in-memory [`EngineAdapter`] double, used throughout the test suite so
//! pool/session/cache state machines are exercised without a live daemon.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{EngineAdapter, EngineError, EngineResult};
use super::types::{ContainerHandle, ContainerSpec, ContainerStats, ExecOutput, ExecRequest};

#[derive(Debug, Clone)]
struct MockContainer {
    spec: ContainerSpec,
    running: bool,
    paused: bool,
}

/// Records every call it receives so tests can assert on ordering and
/// counts, in addition to driving realistic create/start/stop/remove state
/// transitions.
pub struct MockEngine {
    next_id: AtomicU64,
    next_image_seq: AtomicU64,
    containers: Mutex<HashMap<String, MockContainer>>,
    images: Mutex<Vec<(String, i64)>>,
    pub calls: Mutex<Vec<String>>,
    pub fail_create: Mutex<bool>,
    pub exec_result: Mutex<Option<ExecOutput>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            next_image_seq: AtomicU64::new(1),
            containers: Mutex::new(HashMap::new()),
            images: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            fail_create: Mutex::new(false),
            exec_result: Mutex::new(None),
        }
    }

    pub fn container_count(&self) -> usize {
        self.containers.lock().len()
    }

    /// `created` is a monotonically increasing sequence number, not a wall
    /// clock reading, so tests get deterministic creation ordering.
    fn next_created(&self) -> i64 {
        self.next_image_seq.fetch_add(1, Ordering::SeqCst) as i64
    }

    pub fn seed_image(&self, tag: &str) {
        let created = self.next_created();
        self.images.lock().push((tag.to_string(), created));
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineAdapter for MockEngine {
    async fn ping(&self) -> bool {
        true
    }

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<ContainerHandle> {
        self.record("create_container");
        if *self.fail_create.lock() {
            return Err(EngineError::Transport("forced failure".into()));
        }
        let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers.lock().insert(
            id.clone(),
            MockContainer {
                spec: spec.clone(),
                running: false,
                paused: false,
            },
        );
        Ok(ContainerHandle(id))
    }

    async fn start(&self, handle: &ContainerHandle) -> EngineResult<()> {
        self.record("start");
        if let Some(c) = self.containers.lock().get_mut(handle.as_str()) {
            c.running = true;
        }
        Ok(())
    }

    async fn stop(&self, handle: &ContainerHandle) -> EngineResult<()> {
        self.record("stop");
        if let Some(c) = self.containers.lock().get_mut(handle.as_str()) {
            c.running = false;
        }
        Ok(())
    }

    async fn pause(&self, handle: &ContainerHandle) -> EngineResult<()> {
        self.record("pause");
        if let Some(c) = self.containers.lock().get_mut(handle.as_str()) {
            c.paused = true;
        }
        Ok(())
    }

    async fn unpause(&self, handle: &ContainerHandle) -> EngineResult<()> {
        self.record("unpause");
        if let Some(c) = self.containers.lock().get_mut(handle.as_str()) {
            c.paused = false;
        }
        Ok(())
    }

    async fn remove(&self, handle: &ContainerHandle, _force: bool) -> EngineResult<()> {
        self.record("remove");
        self.containers.lock().remove(handle.as_str());
        Ok(())
    }

    async fn exec(&self, _handle: &ContainerHandle, _req: ExecRequest) -> EngineResult<ExecOutput> {
        self.record("exec");
        if let Some(result) = self.exec_result.lock().clone() {
            return Ok(result);
        }
        Ok(ExecOutput {
            stdout: b"ok\n".to_vec(),
            stderr: Vec::new(),
            exit_code: 0,
            duration_ms: 1,
            timed_out: false,
            stdout_truncated: false,
            stderr_truncated: false,
        })
    }

    async fn put_file(&self, _handle: &ContainerHandle, _path: &str, _bytes: Vec<u8>) -> EngineResult<()> {
        self.record("put_file");
        Ok(())
    }

    async fn get_file(&self, _handle: &ContainerHandle, _path: &str) -> EngineResult<Vec<u8>> {
        self.record("get_file");
        Ok(Vec::new())
    }

    async fn commit_image(&self, _handle: &ContainerHandle, tag: &str) -> EngineResult<()> {
        self.record("commit_image");
        let created = self.next_created();
        self.images.lock().push((tag.to_string(), created));
        Ok(())
    }

    async fn list_images(&self) -> EngineResult<Vec<(String, i64)>> {
        self.record("list_images");
        Ok(self.images.lock().clone())
    }

    async fn remove_image(&self, tag: &str, _force: bool) -> EngineResult<()> {
        self.record("remove_image");
        self.images.lock().retain(|(t, _)| t != tag);
        Ok(())
    }

    async fn stats(&self, _handle: &ContainerHandle) -> EngineResult<ContainerStats> {
        self.record("stats");
        Ok(ContainerStats::default())
    }
}
