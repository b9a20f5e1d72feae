//! Top-level error taxonomy consumed at the MCP tool boundary.

use thiserror::Error;

use crate::cache::CacheError;
use crate::engine::EngineError;
use crate::pool::PoolError;
use crate::runtime::RuntimeError;
use crate::security::SecurityError;
use crate::session::SessionError;

/// Errors surfaced by a tool call, translated from every lower layer.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    #[error("execution timed out")]
    Timeout,

    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("container error: {0}")]
    Container(#[from] EngineError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimit { retry_after_ms: u64 },
}

impl From<PoolError> for SandboxError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Engine(e) => SandboxError::Container(e),
            PoolError::NoHealthyContainer => {
                SandboxError::NotFound("no healthy container available".into())
            }
        }
    }
}

impl From<SessionError> for SandboxError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(name) => SandboxError::NotFound(name),
            SessionError::AlreadyExists(name) => SandboxError::AlreadyExists(name),
            SessionError::Engine(e) => SandboxError::Container(e),
        }
    }
}

impl From<CacheError> for SandboxError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Engine(e) => SandboxError::Container(e),
            CacheError::Runtime(msg) => SandboxError::ResourceLimit(msg),
        }
    }
}

impl From<RuntimeError> for SandboxError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::Security(e) => SandboxError::Security(e),
            RuntimeError::Engine(e) => SandboxError::Container(e),
        }
    }
}

pub type SandboxResult<T> = std::result::Result<T, SandboxError>;

/// Coarse category used to map an error onto an [`crate::audit::Severity`]
/// without re-deriving it from the variant name at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Security,
    Timeout,
    ResourceLimit,
    Container,
    NotFound,
    AlreadyExists,
    RateLimit,
}

impl SandboxError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SandboxError::Validation(_) => ErrorCategory::Validation,
            SandboxError::Security(_) => ErrorCategory::Security,
            SandboxError::Timeout => ErrorCategory::Timeout,
            SandboxError::ResourceLimit(_) => ErrorCategory::ResourceLimit,
            SandboxError::Container(_) => ErrorCategory::Container,
            SandboxError::NotFound(_) => ErrorCategory::NotFound,
            SandboxError::AlreadyExists(_) => ErrorCategory::AlreadyExists,
            SandboxError::RateLimit { .. } => ErrorCategory::RateLimit,
        }
    }
}
