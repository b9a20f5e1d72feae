//! One-shot resource statistics collection.

use bollard::container::StatsOptions;
use futures_util::StreamExt;

use super::BollardEngine;
use crate::engine::traits::{EngineError, EngineResult};
use crate::engine::types::{ContainerHandle, ContainerStats};

pub async fn stats(engine: &BollardEngine, handle: &ContainerHandle) -> EngineResult<ContainerStats> {
    let options = StatsOptions {
        stream: false,
        one_shot: true,
    };

    let mut stream = engine.client().stats(handle.as_str(), Some(options));
    let raw = stream
        .next()
        .await
        .ok_or_else(|| EngineError::ContainerNotFound(handle.as_str().to_string()))?
        .map_err(|e| EngineError::Transport(e.to_string()))?;

    let peak_memory_mib = raw.memory_stats.usage.unwrap_or(0) / (1024 * 1024);
    let cpu_ms = raw.cpu_stats.cpu_usage.total_usage / 1_000_000;

    let (disk_read_mib, disk_write_mib) = raw
        .blkio_stats
        .io_service_bytes_recursive
        .unwrap_or_default()
        .iter()
        .fold((0u64, 0u64), |(r, w), entry| {
            let value = entry.value.unwrap_or(0) / (1024 * 1024);
            match entry.op.as_deref() {
                Some("read") | Some("Read") => (r + value, w),
                Some("write") | Some("Write") => (r, w + value),
                _ => (r, w),
            }
        });

    Ok(ContainerStats {
        cpu_ms,
        peak_memory_mib,
        disk_read_mib,
        disk_write_mib,
    })
}
