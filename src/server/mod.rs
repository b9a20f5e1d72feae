//! Top-level object graph: constructs every collaborator once at startup
//! and exposes the six MCP tool operations. Re-expresses the process-wide
//! singletons the distilled design assumed as explicit handles owned by
//! one value, mirroring the teacher's own move from singletons to an
//! explicit `Manager`/`Server` graph built in `cmd::root::run`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audit::{AuditEvent, AuditLog, EventFilter, EventType};
use crate::cache::PackageCache;
use crate::config::Configuration;
use crate::engine::docker::BollardEngine;
use crate::engine::types::{ContainerSpec, NetworkMode};
use crate::engine::{ContainerHandle, EngineAdapter};
use crate::error::{SandboxError, SandboxResult};
use crate::language::Language;
use crate::pool::{ContainerPool, PoolConfig};
use crate::ratelimit::{RateLimitDecision, RateLimiter, RateLimiterConfig};
use crate::runtime::{self, ExecutionContext};
use crate::security::{self, SecurityLevel};
use crate::session::{Session, SessionConfig, SessionStore};

pub struct ExecuteRequest {
    pub language: Language,
    pub code: String,
    pub session: Option<String>,
    pub timeout_ms: Option<u64>,
    pub ml: bool,
}

pub struct ExecuteResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub duration_ms: u64,
}

pub enum SessionAction {
    Create { language: Language, ttl: Option<u64> },
    List,
    Get,
    Pause,
    Resume,
    Destroy,
    Extend { ttl: u64 },
}

pub enum InspectTarget {
    Pool,
    Cache,
    Sessions,
    Audit,
    All,
}

pub enum SecurityAction {
    Events { count: usize },
    Violations { count: usize },
    Stats,
}

/// Builds the default [`ContainerSpec`] for a language at the configured
/// security level. Standalone function (not a closure) so it can be stored
/// as a plain function pointer on [`PoolConfig`]/[`SessionConfig`].
fn default_container_spec(language: Language, security_level: SecurityLevel) -> ContainerSpec {
    ContainerSpec {
        image: language.default_image().to_string(),
        language_label: language.to_string(),
        env: HashMap::new(),
        volume_binds: Vec::new(),
        network: NetworkMode::None,
        gpu: false,
        hardening: security::build_hardening_descriptor(language, security_level),
        labels: HashMap::new(),
    }
}

pub struct Server {
    engine: Arc<dyn EngineAdapter>,
    pool: Arc<ContainerPool>,
    cache: Arc<PackageCache>,
    sessions: Arc<SessionStore>,
    audit: Arc<AuditLog>,
    ratelimit: Arc<RateLimiter>,
    security_level: SecurityLevel,
    default_exec_timeout: Duration,
    shutdown: CancellationToken,
}

impl Server {
    pub fn new(config: &Configuration) -> SandboxResult<Self> {
        let engine: Arc<dyn EngineAdapter> = Arc::new(
            BollardEngine::connect()
                .map_err(SandboxError::Container)?
                .with_caps(crate::engine::types::OutputCaps {
                    max_stdout_bytes: config.engine.max_stdout_bytes,
                    max_stderr_bytes: config.engine.max_stderr_bytes,
                }),
        );

        let security_level = config.security.level();

        let pool = Arc::new(ContainerPool::new(
            engine.clone(),
            PoolConfig {
                min_idle_per_language: config.pool.min_idle_per_language,
                max_active: config.pool.max_active,
                warm_up_languages: config
                    .pool
                    .warm_up_languages
                    .iter()
                    .filter_map(|s| s.parse().ok())
                    .collect(),
                liveness_probe_interval: config.pool.liveness_probe_interval(),
                default_spec: default_spec_fn(security_level),
            },
        ));

        let cache = Arc::new(PackageCache::new(engine.clone()));
        let sessions = Arc::new(SessionStore::new(engine.clone(), Duration::from_secs(30)));
        let audit = Arc::new(AuditLog::new(config.audit.ring_buffer_size, config.audit.log_directory.clone()));
        let ratelimit = Arc::new(RateLimiter::new(RateLimiterConfig {
            window: Duration::from_secs(config.ratelimit.window_secs),
            max_requests: config.ratelimit.max_requests,
            sweep_interval: Duration::from_secs(config.ratelimit.sweep_interval_secs),
        }));

        Ok(Self {
            engine,
            pool,
            cache,
            sessions,
            audit,
            ratelimit,
            security_level,
            default_exec_timeout: config.engine.exec_timeout(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Spawn the janitor, liveness probe, and rate-limiter sweep tasks.
    /// Each runs until `self.shutdown` is cancelled.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        let pool = self.pool.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move { pool.run_probe_loop(token).await });

        let sessions = self.sessions.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move { sessions.run_janitor_loop(token).await });

        let ratelimit = self.ratelimit.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move { ratelimit.run_sweep_loop(token).await });
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.pool.drain().await;
        self.sessions.shutdown().await;
        info!("server shut down cleanly");
    }

    pub fn check_rate_limit(&self, caller_key: &str, operation: &str) -> Result<(), SandboxError> {
        match self.ratelimit.check(caller_key, Some(operation)) {
            RateLimitDecision::Admit => Ok(()),
            RateLimitDecision::Deny { retry_after_ms } => Err(SandboxError::RateLimit { retry_after_ms }),
        }
    }

    pub async fn sandbox_execute(&self, req: ExecuteRequest) -> SandboxResult<ExecuteResponse> {
        let start = Instant::now();
        let timeout = req
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_exec_timeout);

        let source = if req.ml {
            format!("{}{}", runtime::ml_python_prelude(), req.code)
        } else {
            req.code.clone()
        };

        if let Err(e) = security::validate_code(req.language, &source) {
            self.audit.record(
                AuditEvent::new(EventType::ExecuteBlocked, e.to_string())
                    .with_language(req.language)
                    .with_session(req.session.clone().unwrap_or_default()),
            );
            return Err(SandboxError::Security(e));
        }

        let (handle, pooled) = self.resolve_container(&req).await?;

        self.audit.record(
            AuditEvent::new(EventType::ExecuteStart, "execute start")
                .with_language(req.language)
                .with_session(req.session.clone().unwrap_or_default())
                .with_container(handle.as_str().to_string()),
        );

        let ctx = ExecutionContext {
            handle: &handle,
            timeout,
            env: HashMap::new(),
            stdin: None,
            cwd: None,
        };

        let result = runtime::execute(req.language, self.engine.as_ref(), &source, ctx).await;

        if pooled {
            let lease = crate::pool::Lease {
                handle: handle.clone(),
                language: req.language,
            };
            if let Err(e) = self.pool.release(lease).await {
                warn!(error = %e, "failed to release container back to pool");
            }
        }

        match result {
            Ok(output) if output.timed_out => {
                self.audit.record(
                    AuditEvent::new(EventType::ExecuteTimeout, "execution timed out")
                        .with_language(req.language)
                        .with_container(handle.as_str().to_string())
                        .with_duration_ms(output.duration_ms)
                        .with_success(false),
                );
                Err(SandboxError::Timeout)
            }
            Ok(output) => {
                self.audit.record(
                    AuditEvent::new(EventType::ExecuteEnd, "execute end")
                        .with_language(req.language)
                        .with_container(handle.as_str().to_string())
                        .with_duration_ms(output.duration_ms)
                        .with_success(output.exit_code == 0),
                );
                Ok(ExecuteResponse {
                    stdout: output.stdout_string(),
                    stderr: output.stderr_string(),
                    exit_code: output.exit_code,
                    duration_ms: output.duration_ms,
                })
            }
            Err(e) => {
                let event_type = match &e {
                    runtime::RuntimeError::Security(_) => EventType::ExecuteBlocked,
                    runtime::RuntimeError::Engine(_) => EventType::ExecuteError,
                };
                self.audit.record(
                    AuditEvent::new(event_type, e.to_string())
                        .with_language(req.language)
                        .with_container(handle.as_str().to_string())
                        .with_duration_ms(start.elapsed().as_millis() as u64)
                        .with_success(false),
                );
                Err(e.into())
            }
        }
    }

    async fn resolve_container(&self, req: &ExecuteRequest) -> SandboxResult<(ContainerHandle, bool)> {
        if let Some(name) = &req.session {
            let session = self
                .sessions
                .get(name)
                .ok_or_else(|| SandboxError::NotFound(format!("session {name}")))?;
            return Ok((session.handle, false));
        }

        let custom_image = req.ml.then_some(runtime::ML_PYTHON_IMAGE);
        let lease = self.pool.acquire(req.language, custom_image).await?;
        Ok((lease.handle, true))
    }

    pub async fn sandbox_session(
        &self,
        action: SessionAction,
        name: Option<String>,
        id: Option<String>,
    ) -> SandboxResult<Vec<Session>> {
        match action {
            SessionAction::Create { language, ttl } => {
                let name = name.ok_or_else(|| SandboxError::Validation("session create requires a name".into()))?;
                let session = self
                    .sessions
                    .create(
                        &name,
                        SessionConfig {
                            language,
                            image: None,
                            env: HashMap::new(),
                            gpu: false,
                            ttl_seconds: ttl,
                            spec_builder: session_spec_fn(self.security_level),
                        },
                    )
                    .await?;
                self.audit.record(AuditEvent::new(EventType::SessionCreated, name).with_language(language));
                Ok(vec![session])
            }
            SessionAction::List => Ok(self.sessions.list()),
            SessionAction::Get => {
                let key = name.or(id).ok_or_else(|| SandboxError::Validation("session get requires a name or id".into()))?;
                Ok(self.sessions.get(&key).into_iter().collect())
            }
            SessionAction::Pause => {
                let key = id.or(name).ok_or_else(|| SandboxError::Validation("session pause requires an id".into()))?;
                self.sessions.pause(&key).await?;
                Ok(self.sessions.get(&key).into_iter().collect())
            }
            SessionAction::Resume => {
                let key = id.or(name).ok_or_else(|| SandboxError::Validation("session resume requires an id".into()))?;
                self.sessions.resume(&key).await?;
                Ok(self.sessions.get(&key).into_iter().collect())
            }
            SessionAction::Destroy => {
                let key = id.or(name).ok_or_else(|| SandboxError::Validation("session destroy requires an id".into()))?;
                self.sessions.destroy(&key).await?;
                self.audit.record(AuditEvent::new(EventType::SessionDestroyed, key));
                Ok(Vec::new())
            }
            SessionAction::Extend { ttl } => {
                let key = id.or(name).ok_or_else(|| SandboxError::Validation("session extend requires an id".into()))?;
                self.sessions.extend(&key, ttl)?;
                Ok(self.sessions.get(&key).into_iter().collect())
            }
        }
    }

    pub async fn sandbox_install(
        &self,
        session: &str,
        language: Language,
        packages: Vec<String>,
    ) -> SandboxResult<crate::cache::CacheInstallResult> {
        let session = self
            .sessions
            .get(session)
            .ok_or_else(|| SandboxError::NotFound(format!("session {session}")))?;

        let handle = session.handle.clone();
        let handle_for_install = handle.clone();
        let engine = self.engine.clone();
        let packages_for_install = packages.clone();
        let timeout = Duration::from_secs(120);

        let result = self
            .cache
            .install(language, &handle, &packages, || async move {
                let outcome = runtime::install_packages(
                    language,
                    engine.as_ref(),
                    &handle_for_install,
                    &packages_for_install,
                    timeout,
                )
                .await
                .map_err(|e| crate::cache::CacheError::Runtime(e.to_string()))?;
                Ok(outcome.success)
            })
            .await?;

        Ok(result)
    }

    pub async fn sandbox_inspect(&self, target: InspectTarget) -> SandboxResult<InspectReport> {
        Ok(match target {
            InspectTarget::Pool => InspectReport {
                pool: Some(self.pool.stats()),
                ..Default::default()
            },
            InspectTarget::Cache => InspectReport {
                cache: Some(self.cache.stats().await?),
                ..Default::default()
            },
            InspectTarget::Sessions => InspectReport {
                sessions: Some(self.sessions.stats()),
                ..Default::default()
            },
            InspectTarget::Audit => InspectReport {
                audit: Some(self.audit.stats()),
                ..Default::default()
            },
            InspectTarget::All => InspectReport {
                pool: Some(self.pool.stats()),
                cache: Some(self.cache.stats().await?),
                sessions: Some(self.sessions.stats()),
                audit: Some(self.audit.stats()),
            },
        })
    }

    pub fn sandbox_security(&self, action: SecurityAction) -> SecurityReport {
        match action {
            SecurityAction::Events { count } => SecurityReport {
                events: self.audit.recent(count, &EventFilter::default()),
                stats: None,
            },
            SecurityAction::Violations { count } => SecurityReport {
                events: self.audit.security_events(count),
                stats: None,
            },
            SecurityAction::Stats => SecurityReport {
                events: Vec::new(),
                stats: Some(self.audit.stats()),
            },
        }
    }

    pub async fn sandbox_file_read(&self, session: &str, path: &str) -> SandboxResult<Vec<u8>> {
        let session = self.sessions.get(session).ok_or_else(|| SandboxError::NotFound(format!("session {session}")))?;
        let safe_path = security::sanitize_path(path).map_err(SandboxError::Security)?;
        Ok(self.engine.get_file(&session.handle, &safe_path).await?)
    }

    pub async fn sandbox_file_write(&self, session: &str, path: &str, content: Vec<u8>) -> SandboxResult<()> {
        let session = self.sessions.get(session).ok_or_else(|| SandboxError::NotFound(format!("session {session}")))?;
        let safe_path = security::sanitize_path(path).map_err(SandboxError::Security)?;
        Ok(self.engine.put_file(&session.handle, &safe_path, content).await?)
    }

    pub async fn sandbox_file_delete(&self, session: &str, path: &str) -> SandboxResult<()> {
        let session = self.sessions.get(session).ok_or_else(|| SandboxError::NotFound(format!("session {session}")))?;
        let safe_path = security::sanitize_path(path).map_err(SandboxError::Security)?;
        let req = crate::engine::ExecRequest::new(
            vec!["rm".to_string(), "-rf".to_string(), safe_path],
            Duration::from_secs(5),
        );
        self.engine.exec(&session.handle, req).await?;
        Ok(())
    }

    pub async fn sandbox_file_list(&self, session: &str, path: &str) -> SandboxResult<String> {
        let session = self.sessions.get(session).ok_or_else(|| SandboxError::NotFound(format!("session {session}")))?;
        let safe_path = security::sanitize_path(path).map_err(SandboxError::Security)?;
        let req = crate::engine::ExecRequest::new(
            vec!["ls".to_string(), "-la".to_string(), safe_path],
            Duration::from_secs(5),
        );
        let output = self.engine.exec(&session.handle, req).await?;
        Ok(output.stdout_string())
    }

    /// Ping the engine and report whether the configured warm-up languages
    /// currently meet `minIdle`. Backs the `diagnostics`/`--selftest` CLI
    /// subcommand.
    pub async fn selftest(&self, warm_up_languages: &[Language], min_idle: usize) -> bool {
        if !self.engine.ping().await {
            warn!("selftest: engine ping failed");
            return false;
        }

        let stats = self.pool.stats();
        let mut ok = true;
        for language in warm_up_languages {
            let have = stats.per_language.get(language.as_str()).copied().unwrap_or(0);
            if have < min_idle {
                warn!(%language, have, min_idle, "selftest: pool below minIdle");
                ok = false;
            }
        }
        ok
    }
}

#[derive(Debug, Clone, Default)]
pub struct InspectReport {
    pub pool: Option<crate::pool::PoolStats>,
    pub cache: Option<crate::cache::CacheStats>,
    pub sessions: Option<crate::session::SessionStats>,
    pub audit: Option<crate::audit::AuditStats>,
}

pub struct SecurityReport {
    pub events: Vec<AuditEvent>,
    pub stats: Option<crate::audit::AuditStats>,
}

fn default_spec_fn(level: SecurityLevel) -> fn(Language) -> ContainerSpec {
    match level {
        SecurityLevel::Strict => |language| default_container_spec(language, SecurityLevel::Strict),
        SecurityLevel::Standard => |language| default_container_spec(language, SecurityLevel::Standard),
        SecurityLevel::Permissive => |language| default_container_spec(language, SecurityLevel::Permissive),
    }
}

fn session_spec_fn(
    level: SecurityLevel,
) -> fn(Language, Option<&str>, &HashMap<String, String>, bool) -> ContainerSpec {
    fn build(language: Language, image: Option<&str>, env: &HashMap<String, String>, gpu: bool, level: SecurityLevel) -> ContainerSpec {
        let mut spec = default_container_spec(language, level);
        if let Some(image) = image {
            spec.image = image.to_string();
        }
        spec.env = env.clone();
        spec.gpu = gpu;
        spec
    }

    match level {
        SecurityLevel::Strict => |language, image, env, gpu| build(language, image, env, gpu, SecurityLevel::Strict),
        SecurityLevel::Standard => |language, image, env, gpu| build(language, image, env, gpu, SecurityLevel::Standard),
        SecurityLevel::Permissive => |language, image, env, gpu| build(language, image, env, gpu, SecurityLevel::Permissive),
    }
}
