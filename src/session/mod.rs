//! Session Store: long-lived named containers with TTL, pause/resume,
//! extension, and a janitor that destroys expired sessions.

mod entry;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{ContainerHandle, ContainerSpec, EngineAdapter, EngineError};
use crate::language::Language;

pub use entry::{Session, SessionState};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub language: Language,
    pub image: Option<String>,
    pub env: std::collections::HashMap<String, String>,
    pub gpu: bool,
    pub ttl_seconds: Option<u64>,
    pub spec_builder: fn(Language, Option<&str>, &std::collections::HashMap<String, String>, bool) -> ContainerSpec,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SessionStats {
    pub total: usize,
    pub active: usize,
    pub paused: usize,
}

pub struct SessionStore {
    by_id: DashMap<String, Session>,
    by_name: DashMap<String, String>,
    engine: Arc<dyn EngineAdapter>,
    janitor_interval: Duration,
}

impl SessionStore {
    pub fn new(engine: Arc<dyn EngineAdapter>, janitor_interval: Duration) -> Self {
        Self {
            by_id: DashMap::new(),
            by_name: DashMap::new(),
            engine,
            janitor_interval,
        }
    }

    pub async fn create(&self, name: &str, cfg: SessionConfig) -> SessionResult<Session> {
        if self.by_name.contains_key(name) {
            return Err(SessionError::AlreadyExists(name.to_string()));
        }

        let spec = (cfg.spec_builder)(cfg.language, cfg.image.as_deref(), &cfg.env, cfg.gpu);
        let handle = self.engine.create_container(&spec).await?;
        self.engine.start(&handle).await?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let session = Session {
            id: id.clone(),
            name: name.to_string(),
            language: cfg.language,
            handle,
            state: SessionState::Active,
            created_at: now,
            last_used_at: now,
            expires_at: cfg.ttl_seconds.map(|ttl| now + chrono::Duration::seconds(ttl as i64)),
        };

        self.by_name.insert(name.to_string(), id.clone());
        self.by_id.insert(id, session.clone());
        info!(session_id = %session.id, %name, "session created");
        Ok(session)
    }

    /// Look up by id or name. Never errors: a miss is `None`.
    pub fn get(&self, name_or_id: &str) -> Option<Session> {
        let id = self
            .by_name
            .get(name_or_id)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| name_or_id.to_string());

        let mut session = self.by_id.get_mut(&id)?;
        session.last_used_at = Utc::now();
        Some(session.clone())
    }

    pub fn list(&self) -> Vec<Session> {
        self.by_id.iter().map(|e| e.value().clone()).collect()
    }

    /// Pause is a no-op if the session is already paused.
    pub async fn pause(&self, id: &str) -> SessionResult<()> {
        let handle = {
            let session = self.by_id.get(id).ok_or_else(|| SessionError::NotFound(id.to_string()))?;
            if session.state == SessionState::Paused {
                return Ok(());
            }
            session.handle.clone()
        };
        self.engine.pause(&handle).await?;
        if let Some(mut session) = self.by_id.get_mut(id) {
            session.state = SessionState::Paused;
        }
        Ok(())
    }

    /// Resume is a no-op if the session is not paused.
    pub async fn resume(&self, id: &str) -> SessionResult<()> {
        let handle = {
            let session = self.by_id.get(id).ok_or_else(|| SessionError::NotFound(id.to_string()))?;
            if session.state != SessionState::Paused {
                return Ok(());
            }
            session.handle.clone()
        };
        self.engine.unpause(&handle).await?;
        if let Some(mut session) = self.by_id.get_mut(id) {
            session.state = SessionState::Active;
            session.last_used_at = Utc::now();
        }
        Ok(())
    }

    /// Extend a session's TTL by `delta_seconds`. If no expiry is set yet,
    /// sets it to `now + delta`; otherwise extends by `delta`.
    pub fn extend(&self, id: &str, delta_seconds: u64) -> SessionResult<()> {
        let mut session = self.by_id.get_mut(id).ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let delta = chrono::Duration::seconds(delta_seconds as i64);
        session.expires_at = Some(session.expires_at.unwrap_or_else(Utc::now) + delta);
        Ok(())
    }

    /// Destroy a session. Race-safe: if the janitor already removed it,
    /// this returns `Ok(())` rather than an error.
    pub async fn destroy(&self, id: &str) -> SessionResult<()> {
        let Some((_, session)) = self.by_id.remove(id) else {
            return Ok(());
        };
        self.by_name.remove(&session.name);
        self.engine.stop(&session.handle).await?;
        self.engine.remove(&session.handle, true).await?;
        debug!(session_id = %id, "session destroyed");
        Ok(())
    }

    /// Walk the map destroying every session past its expiry. Per-session
    /// destroy failures are swallowed so the remainder still runs.
    pub async fn run_janitor_once(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .by_id
            .iter()
            .filter(|e| matches!(e.value().expires_at, Some(exp) if exp <= now))
            .map(|e| e.key().clone())
            .collect();

        let mut destroyed = 0;
        for id in expired {
            match self.destroy(&id).await {
                Ok(()) => destroyed += 1,
                Err(e) => warn!(session_id = %id, error = %e, "janitor failed to destroy expired session"),
            }
        }
        destroyed
    }

    pub async fn run_janitor_loop(&self, token: CancellationToken) {
        let mut ticker = interval(self.janitor_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => { self.run_janitor_once().await; }
            }
        }
    }

    /// Destroy every session concurrently and drain the maps.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.by_id.iter().map(|e| e.key().clone()).collect();
        let futures = ids.iter().map(|id| self.destroy(id));
        let _ = futures_util::future::join_all(futures).await;
        self.by_id.clear();
        self.by_name.clear();
    }

    pub fn stats(&self) -> SessionStats {
        let mut active = 0;
        let mut paused = 0;
        for entry in self.by_id.iter() {
            match entry.state {
                SessionState::Active => active += 1,
                SessionState::Paused => paused += 1,
            }
        }
        SessionStats {
            total: self.by_id.len(),
            active,
            paused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{HardeningDescriptor, NetworkMode, SeccompProfile};
    use crate::engine::MockEngine;

    fn test_spec(
        language: Language,
        image: Option<&str>,
        env: &std::collections::HashMap<String, String>,
        _gpu: bool,
    ) -> ContainerSpec {
        ContainerSpec {
            image: image.unwrap_or_else(|| language.default_image()).to_string(),
            language_label: language.to_string(),
            env: env.clone(),
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

    fn cfg(ttl: Option<u64>) -> SessionConfig {
        SessionConfig {
            language: Language::Python,
            image: None,
            env: Default::default(),
            gpu: false,
            ttl_seconds: ttl,
            spec_builder: test_spec,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_name() {
        let store = SessionStore::new(Arc::new(MockEngine::new()), Duration::from_secs(30));
        store.create("alpha", cfg(None)).await.unwrap();
        let err = store.create("alpha", cfg(None)).await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn get_missing_session_returns_none_not_error() {
        let store = SessionStore::new(Arc::new(MockEngine::new()), Duration::from_secs(30));
        assert!(store.get("nonexistent").is_none());
    }

    #[tokio::test]
    async fn pause_after_pause_is_a_no_op() {
        let store = SessionStore::new(Arc::new(MockEngine::new()), Duration::from_secs(30));
        let session = store.create("alpha", cfg(None)).await.unwrap();
        store.pause(&session.id).await.unwrap();
        store.pause(&session.id).await.unwrap();
        assert_eq!(store.get(&session.id).unwrap().state, SessionState::Paused);
    }

    #[tokio::test]
    async fn destroy_is_race_safe_against_double_destroy() {
        let store = SessionStore::new(Arc::new(MockEngine::new()), Duration::from_secs(30));
        let session = store.create("alpha", cfg(None)).await.unwrap();
        store.destroy(&session.id).await.unwrap();
        store.destroy(&session.id).await.unwrap();
    }

    #[tokio::test]
    async fn janitor_destroys_sessions_past_expiry() {
        let store = SessionStore::new(Arc::new(MockEngine::new()), Duration::from_secs(30));
        let session = store.create("alpha", cfg(Some(0))).await.unwrap();
        store.extend(&session.id, 0).unwrap();
        // Force immediate expiry for the test rather than sleeping.
        {
            let mut entry = store.by_id.get_mut(&session.id).unwrap();
            entry.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        }
        let destroyed = store.run_janitor_once().await;
        assert_eq!(destroyed, 1);
        assert!(store.get(&session.id).is_none());
    }

    #[tokio::test]
    async fn extend_sets_expiry_when_unset() {
        let store = SessionStore::new(Arc::new(MockEngine::new()), Duration::from_secs(30));
        let session = store.create("alpha", cfg(None)).await.unwrap();
        assert!(session.expires_at.is_none());
        store.extend(&session.id, 60).unwrap();
        assert!(store.get(&session.id).unwrap().expires_at.is_some());
    }
}
