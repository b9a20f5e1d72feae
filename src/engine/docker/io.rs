//! Tar-stream file put/get, image commit/list/remove.

use std::io::Read;

use bollard::image::{CommitContainerOptions, RemoveImageOptions};
use bollard::container::{DownloadFromContainerOptions, UploadToContainerOptions};
use futures_util::StreamExt;
use tracing::info;

use super::BollardEngine;
use crate::engine::traits::{EngineError, EngineResult};
use crate::engine::types::ContainerHandle;

pub async fn put_file(
    engine: &BollardEngine,
    handle: &ContainerHandle,
    path: &str,
    bytes: Vec<u8>,
) -> EngineResult<()> {
    let (dir, file_name) = split_parent(path);

    let mut archive = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    archive
        .append_data(&mut header, &file_name, bytes.as_slice())
        .map_err(|e| EngineError::Io(e.to_string()))?;
    let tar_bytes = archive.into_inner().map_err(|e| EngineError::Io(e.to_string()))?;

    let options = UploadToContainerOptions {
        path: dir,
        ..Default::default()
    };

    engine
        .client()
        .upload_to_container(handle.as_str(), Some(options), tar_bytes.into())
        .await
        .map_err(|e| EngineError::Transport(e.to_string()))
}

pub async fn get_file(
    engine: &BollardEngine,
    handle: &ContainerHandle,
    path: &str,
) -> EngineResult<Vec<u8>> {
    let options = DownloadFromContainerOptions { path };

    let mut stream = engine.client().download_from_container(handle.as_str(), Some(options));
    let mut tar_bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| EngineError::Transport(e.to_string()))?;
        tar_bytes.extend_from_slice(&chunk);
    }

    let mut archive = tar::Archive::new(tar_bytes.as_slice());
    let mut entries = archive.entries().map_err(|e| EngineError::Io(e.to_string()))?;
    let entry = entries
        .next()
        .ok_or_else(|| EngineError::Io(format!("no entry for {path} in tar stream")))?
        .map_err(|e| EngineError::Io(e.to_string()))?;

    let mut out = Vec::new();
    entry
        .take(u64::MAX)
        .read_to_end(&mut out)
        .map_err(|e| EngineError::Io(e.to_string()))?;
    Ok(out)
}

pub async fn commit_image(engine: &BollardEngine, handle: &ContainerHandle, tag: &str) -> EngineResult<()> {
    let (repo, tag_part) = tag.split_once(':').unwrap_or((tag, "latest"));

    let options = CommitContainerOptions {
        container: handle.as_str().to_string(),
        repo: repo.to_string(),
        tag: tag_part.to_string(),
        pause: true,
        ..Default::default()
    };

    engine
        .client()
        .commit_container(options, bollard::container::Config::<String>::default())
        .await
        .map_err(|e| EngineError::Transport(e.to_string()))?;

    info!(%tag, container_id = %handle, "committed container to image");
    Ok(())
}

pub async fn list_images(engine: &BollardEngine) -> EngineResult<Vec<(String, i64)>> {
    let images = engine
        .client()
        .list_images::<String>(None)
        .await
        .map_err(|e| EngineError::Transport(e.to_string()))?;

    Ok(images
        .into_iter()
        .flat_map(|img| {
            let created = img.created;
            img.repo_tags.into_iter().map(move |tag| (tag, created))
        })
        .filter(|(tag, _)| tag != "<none>:<none>")
        .collect())
}

pub async fn remove_image(engine: &BollardEngine, tag: &str, force: bool) -> EngineResult<()> {
    let options = RemoveImageOptions {
        force,
        ..Default::default()
    };

    match engine.client().remove_image(tag, Some(options), None).await {
        Ok(_) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
        Err(e) => Err(EngineError::Transport(e.to_string())),
    }
}

/// Split an absolute container path into (parent_dir, file_name), defaulting
/// the parent to `/workspace` for bare file names.
fn split_parent(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/".to_string(), name.to_string()),
        Some((dir, name)) => (dir.to_string(), name.to_string()),
        None => ("/workspace".to_string(), path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_parent_and_file_name() {
        assert_eq!(
            split_parent("/workspace/out.txt"),
            ("/workspace".to_string(), "out.txt".to_string())
        );
        assert_eq!(split_parent("/x"), ("/".to_string(), "x".to_string()));
        assert_eq!(
            split_parent("bare.txt"),
            ("/workspace".to_string(), "bare.txt".to_string())
        );
    }
}
