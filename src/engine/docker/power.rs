//! Power operations (start/stop/pause/unpause) and `exec`.

use std::time::Instant;

use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::container::KillContainerOptions;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::BollardEngine;
use crate::engine::traits::{EngineError, EngineResult};
use crate::engine::types::{ContainerHandle, ExecOutput, ExecRequest, OutputCaps, TRUNCATION_MARKER};

pub async fn start(engine: &BollardEngine, handle: &ContainerHandle) -> EngineResult<()> {
    match engine
        .client()
        .start_container::<String>(handle.as_str(), None)
        .await
    {
        Ok(_) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 304, .. }) => {
            debug!(container_id = %handle, "already started, collapsing to success");
            Ok(())
        }
        Err(e) => Err(EngineError::Transport(e.to_string())),
    }
}

pub async fn stop(engine: &BollardEngine, handle: &ContainerHandle) -> EngineResult<()> {
    match engine.client().stop_container(handle.as_str(), None).await {
        Ok(_) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 304, .. })
        | Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
            debug!(container_id = %handle, "already stopped, collapsing to success");
            Ok(())
        }
        Err(e) => Err(EngineError::Transport(e.to_string())),
    }
}

pub async fn pause(engine: &BollardEngine, handle: &ContainerHandle) -> EngineResult<()> {
    match engine.client().pause_container(handle.as_str()).await {
        Ok(_) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 409, .. }) => {
            debug!(container_id = %handle, "already paused, collapsing to success");
            Ok(())
        }
        Err(e) => Err(EngineError::Transport(e.to_string())),
    }
}

pub async fn unpause(engine: &BollardEngine, handle: &ContainerHandle) -> EngineResult<()> {
    match engine.client().unpause_container(handle.as_str()).await {
        Ok(_) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 409, .. }) => {
            debug!(container_id = %handle, "not paused, collapsing to success");
            Ok(())
        }
        Err(e) => Err(EngineError::Transport(e.to_string())),
    }
}

#[allow(dead_code)]
pub async fn kill(engine: &BollardEngine, handle: &ContainerHandle, signal: &str) -> EngineResult<()> {
    let options = KillContainerOptions { signal };
    match engine.client().kill_container(handle.as_str(), Some(options)).await {
        Ok(_) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. })
        | Err(bollard::errors::Error::DockerResponseServerError { status_code: 409, .. }) => Ok(()),
        Err(e) => Err(EngineError::Transport(e.to_string())),
    }
}

pub async fn exec(
    engine: &BollardEngine,
    handle: &ContainerHandle,
    req: ExecRequest,
    caps: OutputCaps,
) -> EngineResult<ExecOutput> {
    let exec_config = CreateExecOptions {
        cmd: Some(req.argv.clone()),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        attach_stdin: Some(req.stdin.is_some()),
        env: Some(
            req.env
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect(),
        ),
        working_dir: req.cwd.clone(),
        ..Default::default()
    };

    let created = engine
        .client()
        .create_exec(handle.as_str(), exec_config)
        .await
        .map_err(|e| EngineError::Transport(e.to_string()))?;

    let start = Instant::now();

    let run = async {
        let started = engine
            .client()
            .start_exec(&created.id, None)
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut stdout_truncated = false;
        let mut stderr_truncated = false;

        if let StartExecResults::Attached { mut output, mut input } = started {
            if let Some(stdin) = req.stdin {
                let _ = input.write_all(&stdin).await;
                let _ = input.shutdown().await;
            }
            drop(input);

            while let Some(frame) = output.next().await {
                let frame = frame.map_err(|e| EngineError::Transport(e.to_string()))?;
                match frame {
                    bollard::container::LogOutput::StdOut { message } => {
                        append_capped(&mut stdout, &message, caps.max_stdout_bytes, &mut stdout_truncated);
                    }
                    bollard::container::LogOutput::StdErr { message } => {
                        append_capped(&mut stderr, &message, caps.max_stderr_bytes, &mut stderr_truncated);
                    }
                    _ => {}
                }
            }
        }

        let inspect = engine
            .client()
            .inspect_exec(&created.id)
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        Ok::<_, EngineError>((stdout, stderr, stdout_truncated, stderr_truncated, inspect.exit_code.unwrap_or(-1)))
    };

    match tokio::time::timeout(req.timeout, run).await {
        Ok(Ok((stdout, stderr, stdout_truncated, stderr_truncated, exit_code))) => Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
            duration_ms: start.elapsed().as_millis() as u64,
            timed_out: false,
            stdout_truncated,
            stderr_truncated,
        }),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            warn!(container_id = %handle, "exec deadline exceeded, closing stream");
            Ok(ExecOutput {
                stdout: Vec::new(),
                stderr: Vec::new(),
                exit_code: -1,
                duration_ms: start.elapsed().as_millis() as u64,
                timed_out: true,
                stdout_truncated: false,
                stderr_truncated: false,
            })
        }
    }
}

fn append_capped(buf: &mut Vec<u8>, chunk: &bytes::Bytes, cap: usize, truncated: &mut bool) {
    if *truncated {
        return;
    }
    let remaining = cap.saturating_sub(buf.len());
    if chunk.len() <= remaining {
        buf.extend_from_slice(chunk);
    } else {
        buf.extend_from_slice(&chunk[..remaining]);
        buf.extend_from_slice(TRUNCATION_MARKER.as_bytes());
        *truncated = true;
    }
}
