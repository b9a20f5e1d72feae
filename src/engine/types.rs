//! Wire-level types shared by every [`super::EngineAdapter`] implementation.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

/// Network mode for a created container. Default is fully isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    /// No network connectivity at all.
    None,
    /// Attached to the named bridge network.
    Bridge,
}

impl Default for NetworkMode {
    fn default() -> Self {
        NetworkMode::None
    }
}

/// Syscall-filter profile: an allow-list base plus per-language extras, and
/// an explicit kill list. Produced by the Security Gate's hardening
/// descriptor builder, consumed at container create.
#[derive(Debug, Clone, Default)]
pub struct SeccompProfile {
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
}

/// The hardening descriptor the Security Gate attaches to every
/// [`ContainerSpec`]. Field names mirror the vocabulary in the spec so a
/// reviewer can match them back one-for-one.
#[derive(Debug, Clone)]
pub struct HardeningDescriptor {
    pub memory_bytes: u64,
    pub cpu_quota: i64,
    pub cpu_period: i64,
    pub pids_limit: i64,
    pub seccomp: SeccompProfile,
    pub cap_drop: Vec<String>,
    pub cap_add: Vec<String>,
    pub no_new_privileges: bool,
    pub read_only_rootfs: bool,
    pub tmpfs_mounts: Vec<(String, u64)>,
    pub user: String,
    pub ulimit_nofile: u64,
    pub ulimit_nproc: u64,
}

/// Everything needed to create a container, independent of any particular
/// engine client.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub language_label: String,
    pub env: HashMap<String, String>,
    pub volume_binds: Vec<VolumeBind>,
    pub network: NetworkMode,
    pub gpu: bool,
    pub hardening: HardeningDescriptor,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct VolumeBind {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

/// Opaque handle to a created container. Cheap to clone; carries no
/// liveness guarantee beyond "this id was returned by create_container".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ContainerHandle(pub String);

impl ContainerHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameters for a single exec call.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub argv: Vec<String>,
    pub timeout: Duration,
    pub env: HashMap<String, String>,
    pub stdin: Option<Vec<u8>>,
    pub cwd: Option<String>,
}

impl ExecRequest {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            argv,
            timeout,
            env: HashMap::new(),
            stdin: None,
            cwd: None,
        }
    }
}

/// Demuxed, cap-enforced result of an exec call.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i64,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

impl ExecOutput {
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Resource usage snapshot for a container, as reported by `stats`.
#[derive(Debug, Clone, Default)]
pub struct ContainerStats {
    pub cpu_ms: u64,
    pub peak_memory_mib: u64,
    pub disk_read_mib: u64,
    pub disk_write_mib: u64,
}

/// Output caps enforced by [`super::EngineAdapter::exec`]. Defaults match
/// the spec: 10 MiB stdout, 5 MiB stderr.
#[derive(Debug, Clone, Copy)]
pub struct OutputCaps {
    pub max_stdout_bytes: usize,
    pub max_stderr_bytes: usize,
}

impl Default for OutputCaps {
    fn default() -> Self {
        Self {
            max_stdout_bytes: 10 * 1024 * 1024,
            max_stderr_bytes: 5 * 1024 * 1024,
        }
    }
}

pub const TRUNCATION_MARKER: &str = "\n...[output truncated]...\n";
