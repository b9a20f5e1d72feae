//! Container creation and destruction.

use std::collections::HashMap;

use bollard::container::{Config, CreateContainerOptions, RemoveContainerOptions};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, RestartPolicy, RestartPolicyNameEnum};
use futures_util::StreamExt;
use serde_json::json;
use tracing::{debug, info, warn};

use super::BollardEngine;
use crate::engine::traits::{EngineError, EngineResult};
use crate::engine::types::{ContainerHandle, ContainerSpec, NetworkMode, SeccompProfile};

/// Render a [`SeccompProfile`] as the Docker-native seccomp JSON document:
/// default-deny, with `allowed` explicitly admitted and `blocked` named
/// again for clarity even though default-deny already covers them.
fn seccomp_profile_json(profile: &SeccompProfile) -> String {
    let mut syscalls = vec![json!({
        "names": profile.allowed,
        "action": "SCMP_ACT_ALLOW",
    })];
    if !profile.blocked.is_empty() {
        syscalls.push(json!({
            "names": profile.blocked,
            "action": "SCMP_ACT_ERRNO",
        }));
    }

    json!({
        "defaultAction": "SCMP_ACT_ERRNO",
        "architectures": ["SCMP_ARCH_X86_64", "SCMP_ARCH_X86", "SCMP_ARCH_X32"],
        "syscalls": syscalls,
    })
    .to_string()
}

pub async fn create_container(
    engine: &BollardEngine,
    spec: &ContainerSpec,
) -> EngineResult<ContainerHandle> {
    ensure_image_exists(engine, &spec.image).await?;

    let env_vars: Vec<String> = spec
        .env
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    let mut mounts = Vec::new();
    for bind in &spec.volume_binds {
        mounts.push(bollard::models::Mount {
            source: Some(bind.host_path.clone()),
            target: Some(bind.container_path.clone()),
            typ: Some(bollard::models::MountTypeEnum::BIND),
            read_only: Some(bind.read_only),
            ..Default::default()
        });
    }

    let mut tmpfs = HashMap::new();
    for (path, size_mb) in &spec.hardening.tmpfs_mounts {
        tmpfs.insert(path.clone(), format!("rw,exec,nosuid,size={size_mb}M"));
    }

    let mut labels = spec.labels.clone();
    labels.insert("service".to_string(), "sandboxd".to_string());
    labels.insert("language".to_string(), spec.language_label.clone());

    let network_mode = match spec.network {
        NetworkMode::None => "none".to_string(),
        NetworkMode::Bridge => "bridge".to_string(),
    };

    let mut security_opt = vec![];
    if spec.hardening.no_new_privileges {
        security_opt.push("no-new-privileges".to_string());
    }
    if !spec.hardening.seccomp.allowed.is_empty() {
        security_opt.push(format!("seccomp={}", seccomp_profile_json(&spec.hardening.seccomp)));
    }

    let host_config = HostConfig {
        mounts: Some(mounts),
        tmpfs: Some(tmpfs),
        memory: Some(spec.hardening.memory_bytes as i64),
        memory_swap: Some(spec.hardening.memory_bytes as i64),
        cpu_quota: Some(spec.hardening.cpu_quota),
        cpu_period: Some(spec.hardening.cpu_period),
        pids_limit: Some(spec.hardening.pids_limit),
        cap_drop: Some(spec.hardening.cap_drop.clone()),
        cap_add: if spec.hardening.cap_add.is_empty() {
            None
        } else {
            Some(spec.hardening.cap_add.clone())
        },
        security_opt: Some(security_opt),
        network_mode: Some(network_mode),
        readonly_rootfs: Some(spec.hardening.read_only_rootfs),
        restart_policy: Some(RestartPolicy {
            name: Some(RestartPolicyNameEnum::NO),
            ..Default::default()
        }),
        ulimits: Some(vec![
            bollard::models::ResourcesUlimits {
                name: Some("nofile".to_string()),
                soft: Some(spec.hardening.ulimit_nofile as i64),
                hard: Some(spec.hardening.ulimit_nofile as i64),
            },
            bollard::models::ResourcesUlimits {
                name: Some("nproc".to_string()),
                soft: Some(spec.hardening.ulimit_nproc as i64),
                hard: Some(spec.hardening.ulimit_nproc as i64),
            },
            bollard::models::ResourcesUlimits {
                name: Some("core".to_string()),
                soft: Some(0),
                hard: Some(0),
            },
        ]),
        ..Default::default()
    };

    let container_config = Config {
        image: Some(spec.image.clone()),
        env: Some(env_vars),
        user: Some(spec.hardening.user.clone()),
        labels: Some(labels),
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        open_stdin: Some(true),
        tty: Some(false),
        working_dir: Some("/workspace".to_string()),
        host_config: Some(host_config),
        // Keep the container alive until exec'd into; the command just
        // idles so the pool can hold it warm between uses.
        cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
        ..Default::default()
    };

    let options = CreateContainerOptions::<String> {
        name: String::new(),
        platform: None,
    };

    let response = engine
        .client()
        .create_container(Some(options), container_config)
        .await
        .map_err(|e| EngineError::Transport(e.to_string()))?;

    info!(container_id = %response.id, image = %spec.image, "created container");
    Ok(ContainerHandle(response.id))
}

pub async fn remove_container(
    engine: &BollardEngine,
    handle: &ContainerHandle,
    force: bool,
) -> EngineResult<()> {
    let options = RemoveContainerOptions {
        force,
        v: true,
        ..Default::default()
    };

    match engine.client().remove_container(handle.as_str(), Some(options)).await {
        Ok(_) => {
            info!(container_id = %handle, "removed container");
            Ok(())
        }
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
            debug!(container_id = %handle, "container already gone, remove is a no-op");
            Ok(())
        }
        Err(e) => Err(EngineError::Transport(e.to_string())),
    }
}

async fn ensure_image_exists(engine: &BollardEngine, image: &str) -> EngineResult<()> {
    match engine.client().inspect_image(image).await {
        Ok(_) => return Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
            info!(%image, "image not present locally, pulling");
        }
        Err(e) => {
            warn!(%image, error = %e, "error inspecting image, attempting pull anyway");
        }
    }

    let options = CreateImageOptions {
        from_image: image,
        ..Default::default()
    };

    let mut stream = engine.client().create_image(Some(options), None, None);
    while let Some(result) = stream.next().await {
        result.map_err(|e| EngineError::ImageNotFound(format!("pulling {image}: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seccomp_profile_defaults_to_deny_and_allows_the_allow_list() {
        let profile = SeccompProfile {
            allowed: vec!["read".to_string(), "write".to_string()],
            blocked: vec!["ptrace".to_string()],
        };
        let rendered: serde_json::Value = serde_json::from_str(&seccomp_profile_json(&profile)).unwrap();
        assert_eq!(rendered["defaultAction"], "SCMP_ACT_ERRNO");
        assert_eq!(rendered["syscalls"][0]["action"], "SCMP_ACT_ALLOW");
        assert_eq!(rendered["syscalls"][0]["names"][0], "read");
        assert_eq!(rendered["syscalls"][1]["action"], "SCMP_ACT_ERRNO");
        assert_eq!(rendered["syscalls"][1]["names"][0], "ptrace");
    }
}
