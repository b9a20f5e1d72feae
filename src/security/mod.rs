//! The Security Gate: stateless validators plus a hardening descriptor
//! builder. Nothing in this module holds state or touches the engine; every
//! function is a pure check over caller-supplied strings.

mod code_patterns;
mod hardening;
mod packages;
mod path;
mod volumes;

use thiserror::Error;

pub use code_patterns::validate_code;
pub use hardening::build_hardening_descriptor;
pub use packages::{validate_packages, PackageValidation};
pub use path::sanitize_path;
pub use volumes::validate_volume_mount;

/// Security posture requested for a container. Tightens or loosens the
/// hardening descriptor; never changes which code patterns are blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityLevel {
    Strict,
    #[default]
    Standard,
    Permissive,
}

impl std::str::FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(SecurityLevel::Strict),
            "standard" => Ok(SecurityLevel::Standard),
            "permissive" => Ok(SecurityLevel::Permissive),
            other => Err(format!("unknown security level: {other}")),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("blocked code pattern: {0}")]
    BlockedCodePattern(String),

    #[error("blocked package: {0}")]
    BlockedPackage(String),

    #[error("invalid package spec: {0}")]
    InvalidPackageSpec(String),

    #[error("path traversal attempt: {0}")]
    PathTraversal(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("disallowed volume mount: {0}")]
    DisallowedVolumeMount(String),
}
