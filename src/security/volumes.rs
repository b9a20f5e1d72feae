//! Host/container volume mount validation.

use super::SecurityError;

const DISALLOWED_HOST_PREFIXES: &[&str] = &[
    "/etc", "/proc", "/sys", "/dev", "/var", "/usr", "/bin", "/sbin", "/lib", "/lib64", "/root",
    "/home", "/boot", "/opt", "/run", "/srv", "/mnt", "/media",
];

const ALLOWED_CONTAINER_PREFIXES: &[&str] = &["/workspace", "/data"];

/// Reject a volume mount whose host path touches a system directory (or the
/// engine's own socket) or whose container-side path escapes the allowed
/// mount points.
pub fn validate_volume_mount(
    host_path: &str,
    container_path: &str,
    engine_socket_path: &str,
) -> Result<(), SecurityError> {
    if host_path == engine_socket_path {
        return Err(SecurityError::DisallowedVolumeMount(format!(
            "{host_path} is the container engine socket"
        )));
    }

    if DISALLOWED_HOST_PREFIXES
        .iter()
        .any(|prefix| host_path == *prefix || host_path.starts_with(&format!("{prefix}/")))
    {
        return Err(SecurityError::DisallowedVolumeMount(format!(
            "{host_path} is under a disallowed system directory"
        )));
    }

    if !ALLOWED_CONTAINER_PREFIXES
        .iter()
        .any(|prefix| container_path == *prefix || container_path.starts_with(&format!("{prefix}/")))
    {
        return Err(SecurityError::DisallowedVolumeMount(format!(
            "{container_path} is not under /workspace or /data"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_workspace_mount() {
        assert!(validate_volume_mount("/data/sandbox/work-123", "/workspace", "/var/run/docker.sock").is_ok());
    }

    #[test]
    fn rejects_home_and_srv_mounts() {
        assert!(validate_volume_mount("/home/sandbox/work", "/workspace", "/var/run/docker.sock").is_err());
        assert!(validate_volume_mount("/srv/sandbox/work", "/workspace", "/var/run/docker.sock").is_err());
    }

    #[test]
    fn rejects_docker_socket() {
        assert!(validate_volume_mount(
            "/var/run/docker.sock",
            "/workspace",
            "/var/run/docker.sock"
        )
        .is_err());
    }

    #[test]
    fn rejects_etc_mount() {
        assert!(validate_volume_mount("/etc/passwd", "/workspace/passwd", "/var/run/docker.sock").is_err());
    }

    #[test]
    fn rejects_container_path_outside_allowed_roots() {
        assert!(validate_volume_mount("/opt/sandbox/cache-host", "/etc/hack", "/var/run/docker.sock").is_err());
    }
}
