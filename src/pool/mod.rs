//! Container Pool: a per-language queue of pre-warmed, idle containers.
//! Uses a lock-free top-level map with fine-grained interior locking,
//! matching the teacher's `Manager` (`DashMap<String, Arc<Server>>`)
//! rather than one global mutex.

mod entry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{ContainerHandle, ContainerSpec, EngineAdapter, EngineError};
use crate::language::Language;

pub use entry::PooledContainer;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("no healthy container available")]
    NoHealthyContainer,
}

pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_idle_per_language: usize,
    pub max_active: usize,
    pub warm_up_languages: Vec<Language>,
    pub liveness_probe_interval: Duration,
    pub default_spec: fn(Language) -> ContainerSpec,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub per_language: std::collections::HashMap<String, usize>,
    pub healthy: usize,
    pub unhealthy: usize,
}

/// A handed-out container, detached from the pool's idle map. Dropping this
/// without calling `release` leaks the container from the pool's point of
/// view; callers MUST release or destroy it explicitly.
pub struct Lease {
    pub handle: ContainerHandle,
    pub language: Language,
}

pub struct ContainerPool {
    idle: DashMap<String, PooledContainer>,
    config: PoolConfig,
    engine: Arc<dyn EngineAdapter>,
}

impl ContainerPool {
    pub fn new(engine: Arc<dyn EngineAdapter>, config: PoolConfig) -> Self {
        Self {
            idle: DashMap::new(),
            config,
            engine,
        }
    }

    /// Acquire a container for `language`. A `custom_image` bypasses the
    /// pool entirely: ML and other specialized images are warm-started by
    /// session, not by pool, to avoid mixing images in per-language queues.
    pub async fn acquire(&self, language: Language, custom_image: Option<&str>) -> PoolResult<Lease> {
        if let Some(image) = custom_image {
            let handle = self.create_container(language, image).await?;
            return Ok(Lease { handle, language });
        }

        let found = self
            .idle
            .iter()
            .find(|entry| entry.value().language == language && entry.value().healthy)
            .map(|entry| entry.key().clone());

        let handle = if let Some(id) = found {
            match self.idle.remove(&id) {
                Some((_, mut entry)) => {
                    entry.touch();
                    debug!(container_id = %id, %language, "pool hit");
                    entry.handle
                }
                None => {
                    // Another acquirer raced us to the same entry; fall
                    // back to a fresh container rather than hand out a
                    // container twice.
                    self.create_container(language, self.config_default_image(language)).await?
                }
            }
        } else {
            debug!(%language, "pool miss, creating fresh container");
            self.create_container(language, self.config_default_image(language)).await?
        };

        self.schedule_backfill_if_needed(language);

        Ok(Lease { handle, language })
    }

    /// Release a container back to the pool. Runs the cleaner; a cleaner
    /// failure retires the container instead of re-pooling it.
    pub async fn release(&self, lease: Lease) -> PoolResult<()> {
        if self.idle.len() >= self.config.max_active {
            if let Some(lru_id) = self.lru_entry_id() {
                if let Some((_, entry)) = self.idle.remove(&lru_id) {
                    debug!(container_id = %lru_id, "evicting LRU pool entry to respect maxActive");
                    let _ = self.engine.remove(&entry.handle, true).await;
                }
            }
        }

        match self.clean(&lease.handle).await {
            Ok(()) => {
                self.idle.insert(
                    lease.handle.as_str().to_string(),
                    PooledContainer::new(lease.handle, lease.language),
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "cleaner failed, retiring container instead of re-pooling");
                self.engine.remove(&lease.handle, true).await?;
                Ok(())
            }
        }
    }

    /// Periodic liveness probe: run a trivial command in every pooled
    /// container; a failing or non-zero exit retires the entry.
    pub async fn probe_once(&self) {
        let ids: Vec<String> = self.idle.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            let Some(entry) = self.idle.get(&id).map(|e| e.value().handle.clone()) else {
                continue;
            };
            let req = crate::engine::ExecRequest::new(
                vec!["true".to_string()],
                Duration::from_secs(2),
            );
            let healthy = matches!(self.engine.exec(&entry, req).await, Ok(out) if out.exit_code == 0 && !out.timed_out);
            if !healthy {
                if let Some((_, entry)) = self.idle.remove(&id) {
                    warn!(container_id = %id, "liveness probe failed, destroying");
                    let _ = self.engine.remove(&entry.handle, true).await;
                }
            }
        }
    }

    /// Run the periodic liveness probe until `token` is cancelled.
    pub async fn run_probe_loop(&self, token: CancellationToken) {
        let mut ticker = interval(self.config.liveness_probe_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.probe_once().await,
            }
        }
    }

    /// Destroy every pooled container concurrently, ignoring individual
    /// failures, and clear the map.
    pub async fn drain(&self) {
        let entries: Vec<PooledContainer> = self.idle.iter().map(|e| e.value().clone()).collect();
        self.idle.clear();
        let futures = entries.into_iter().map(|entry| async move {
            let _ = self.engine.remove(&entry.handle, true).await;
        });
        futures_util::future::join_all(futures).await;
        info!("pool drained");
    }

    pub fn stats(&self) -> PoolStats {
        let mut per_language = std::collections::HashMap::new();
        let mut healthy = 0;
        let mut unhealthy = 0;
        for entry in self.idle.iter() {
            *per_language.entry(entry.language.to_string()).or_insert(0) += 1;
            if entry.healthy {
                healthy += 1;
            } else {
                unhealthy += 1;
            }
        }
        PoolStats {
            total: self.idle.len(),
            per_language,
            healthy,
            unhealthy,
        }
    }

    fn config_default_image(&self, language: Language) -> &'static str {
        language.default_image()
    }

    async fn create_container(&self, language: Language, image: &str) -> PoolResult<ContainerHandle> {
        let mut spec = (self.config.default_spec)(language);
        spec.image = image.to_string();
        let handle = self.engine.create_container(&spec).await?;
        self.engine.start(&handle).await?;
        Ok(handle)
    }

    async fn clean(&self, handle: &ContainerHandle) -> PoolResult<()> {
        let script = cleaner_script();
        let req = crate::engine::ExecRequest::new(
            vec!["sh".to_string(), "-c".to_string(), script],
            Duration::from_secs(10),
        );
        let output = self.engine.exec(handle, req).await?;
        if output.exit_code != 0 || output.timed_out {
            return Err(PoolError::Engine(EngineError::Transport(
                "cleaner script exited non-zero".to_string(),
            )));
        }
        Ok(())
    }

    fn lru_entry_id(&self) -> Option<String> {
        self.idle
            .iter()
            .min_by_key(|entry| entry.value().last_used_at)
            .map(|entry| entry.key().clone())
    }

    fn schedule_backfill_if_needed(&self, language: Language) {
        let current = self.idle.iter().filter(|e| e.language == language).count();
        if current >= self.config.min_idle_per_language {
            return;
        }
        let engine = self.engine.clone();
        let image = self.config_default_image(language);
        let spec_fn = self.config.default_spec;
        tokio::spawn(async move {
            let mut spec = spec_fn(language);
            spec.image = image.to_string();
            match engine.create_container(&spec).await {
                Ok(handle) => {
                    if let Err(e) = engine.start(&handle).await {
                        warn!(error = %e, "backfill start failed");
                    }
                    debug!(%language, container_id = %handle, "backfill created one container");
                }
                Err(e) => warn!(error = %e, %language, "backfill create failed, non-fatal"),
            }
        });
    }
}

fn cleaner_script() -> String {
    "find /workspace -mindepth 1 -delete 2>/dev/null; \
     rm -rf /tmp/* /var/tmp/* 2>/dev/null; \
     rm -f ~/.bash_history ~/.python_history ~/.node_repl_history 2>/dev/null; \
     rm -rf ~/.cache/pip ~/.npm ~/.cargo/registry/cache /root/go/pkg/mod/cache 2>/dev/null; \
     find / -xdev -name __pycache__ -type d -exec rm -rf {} + 2>/dev/null; \
     find / -xdev -name '*.pyc' -delete 2>/dev/null; \
     ipcrm --all=shm 2>/dev/null; ipcrm --all=sem 2>/dev/null; ipcrm --all=msg 2>/dev/null; \
     mkdir -p /workspace && chmod 0755 /workspace; \
     true"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::engine::types::{HardeningDescriptor, NetworkMode, SeccompProfile};

    fn test_spec(language: Language) -> ContainerSpec {
        ContainerSpec {
            image: language.default_image().to_string(),
            language_label: language.to_string(),
            env: Default::default(),
            volume_binds: Vec::new(),
            network: NetworkMode::None,
            gpu: false,
            hardening: HardeningDescriptor {
                memory_bytes: 256 * 1024 * 1024,
                cpu_quota: 50_000,
                cpu_period: 100_000,
                pids_limit: 64,
                seccomp: SeccompProfile::default(),
                cap_drop: vec!["ALL".to_string()],
                cap_add: vec![],
                no_new_privileges: true,
                read_only_rootfs: true,
                tmpfs_mounts: vec![],
                user: "1000:1000".to_string(),
                ulimit_nofile: 256,
                ulimit_nproc: 64,
            },
            labels: Default::default(),
        }
    }

    fn test_pool(engine: Arc<MockEngine>) -> ContainerPool {
        ContainerPool::new(
            engine,
            PoolConfig {
                min_idle_per_language: 0,
                max_active: 2,
                warm_up_languages: vec![],
                liveness_probe_interval: Duration::from_secs(30),
                default_spec: test_spec,
            },
        )
    }

    #[tokio::test]
    async fn acquire_on_empty_pool_creates_a_container() {
        let engine = Arc::new(MockEngine::new());
        let pool = test_pool(engine.clone());
        let lease = pool.acquire(Language::Python, None).await.unwrap();
        assert_eq!(lease.language, Language::Python);
        assert_eq!(engine.container_count(), 1);
    }

    #[tokio::test]
    async fn two_immediate_acquires_get_distinct_containers() {
        let engine = Arc::new(MockEngine::new());
        let pool = test_pool(engine.clone());
        let a = pool.acquire(Language::Python, None).await.unwrap();
        let b = pool.acquire(Language::Python, None).await.unwrap();
        assert_ne!(a.handle, b.handle);
    }

    #[tokio::test]
    async fn release_then_acquire_reuses_the_same_container() {
        let engine = Arc::new(MockEngine::new());
        let pool = test_pool(engine.clone());
        let lease = pool.acquire(Language::Python, None).await.unwrap();
        let handle = lease.handle.clone();
        pool.release(lease).await.unwrap();

        let reused = pool.acquire(Language::Python, None).await.unwrap();
        assert_eq!(reused.handle, handle);
    }

    #[tokio::test]
    async fn lru_eviction_keeps_pool_at_max_active() {
        let engine = Arc::new(MockEngine::new());
        let pool = test_pool(engine.clone());

        let a = pool.acquire(Language::Python, None).await.unwrap();
        let b = pool.acquire(Language::Python, None).await.unwrap();
        let c = pool.acquire(Language::Python, None).await.unwrap();

        pool.release(a).await.unwrap();
        pool.release(b).await.unwrap();
        pool.release(c).await.unwrap();

        let stats = pool.stats();
        assert_eq!(stats.total, 2);
    }

    #[tokio::test]
    async fn custom_image_bypasses_the_pool() {
        let engine = Arc::new(MockEngine::new());
        let pool = test_pool(engine.clone());
        let lease = pool.acquire(Language::Python, Some("sandboxd/python-ml:custom")).await.unwrap();
        pool.release(lease).await.unwrap();
        // Bypassed containers are still tracked for pooling once released.
        assert_eq!(pool.stats().total, 1);
    }
}
