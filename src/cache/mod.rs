//! Package Cache: commits a container's installed-package state to an
//! image keyed by `sha256(language || json(sorted(packages)))`, so a
//! repeat install across containers skips the package manager entirely.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::engine::{ContainerHandle, EngineAdapter, EngineError};
use crate::language::Language;

const CACHE_IMAGE_PREFIX: &str = "sandbox";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("runtime error: {0}")]
    Runtime(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Clone, Serialize)]
pub struct CacheInstallResult {
    pub success: bool,
    /// `true` if the package set was already known to the cache. A hit
    /// never mutates the caller-supplied container — callers that need the
    /// packages physically present in *this* container must realize that
    /// through the image system separately.
    pub cached: bool,
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct Counters {
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_tagged_images: usize,
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
}

/// Compute the cache key for a (language, packages) pair. Packages are
/// sorted before hashing so install order never affects the key.
pub fn cache_key(language: Language, packages: &[String]) -> String {
    let mut sorted = packages.to_vec();
    sorted.sort();
    let payload = format!("{}{}", language.as_str(), serde_json::to_string(&sorted).unwrap());
    let digest = Sha256::digest(payload.as_bytes());
    hex::encode(digest)
}

pub fn image_tag(language: Language, key: &str) -> String {
    format!("{CACHE_IMAGE_PREFIX}-{}:{}", language.as_str(), &key[..12])
}

pub struct PackageCache {
    engine: Arc<dyn EngineAdapter>,
    counters: Mutex<Counters>,
}

impl PackageCache {
    pub fn new(engine: Arc<dyn EngineAdapter>) -> Self {
        Self {
            engine,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Install `packages` for `language`, consulting the cache first. On a
    /// miss, `do_install` is invoked to perform the real install against
    /// `handle`; on success the container is committed under the derived
    /// tag.
    pub async fn install<F, Fut>(
        &self,
        language: Language,
        handle: &ContainerHandle,
        packages: &[String],
        do_install: F,
    ) -> CacheResult<CacheInstallResult>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = CacheResult<bool>>,
    {
        let key = cache_key(language, packages);
        let tag = image_tag(language, &key);

        if self.engine.image_exists(&tag).await? {
            self.counters.lock().hits += 1;
            debug!(%tag, "cache hit");
            return Ok(CacheInstallResult {
                success: true,
                cached: true,
                packages: packages.to_vec(),
            });
        }

        self.counters.lock().misses += 1;
        debug!(%tag, "cache miss, delegating to runtime adapter");

        let success = do_install().await?;
        if success {
            self.engine.commit_image(handle, &tag).await?;
            info!(%tag, "committed installed packages to cache image");
        }

        Ok(CacheInstallResult {
            success,
            cached: false,
            packages: packages.to_vec(),
        })
    }

    /// Keep the `keep_per_language` most recently created cache images per
    /// language, destroying the rest.
    pub async fn prune(&self, keep_per_language: usize) -> CacheResult<usize> {
        let images = self.engine.list_images().await?;
        let mut by_language: std::collections::HashMap<String, Vec<(String, i64)>> = std::collections::HashMap::new();
        for (tag, created) in images {
            if let Some(lang) = language_from_tag(&tag) {
                by_language.entry(lang).or_default().push((tag, created));
            }
        }

        let mut removed = 0;
        for (_, mut tags) in by_language {
            tags.sort_by_key(|(_, created)| *created);
            if tags.len() > keep_per_language {
                for (tag, _) in &tags[..tags.len() - keep_per_language] {
                    self.engine.remove_image(tag, true).await?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Remove every image bearing the cache prefix. Each image removal is
    /// atomic; the clear as a whole is not.
    pub async fn clear(&self) -> CacheResult<usize> {
        let images = self.engine.list_images().await?;
        let mut removed = 0;
        for (tag, _) in images {
            if tag.starts_with(&format!("{CACHE_IMAGE_PREFIX}-")) {
                self.engine.remove_image(&tag, true).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> CacheResult<CacheStats> {
        let images = self.engine.list_images().await?;
        let total_tagged_images = images
            .iter()
            .filter(|(tag, _)| tag.starts_with(&format!("{CACHE_IMAGE_PREFIX}-")))
            .count();

        let counters = self.counters.lock().clone();
        let total = counters.hits + counters.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            counters.hits as f64 / total as f64
        };

        Ok(CacheStats {
            total_tagged_images,
            hit_rate,
            hits: counters.hits,
            misses: counters.misses,
        })
    }
}

fn language_from_tag(tag: &str) -> Option<String> {
    let rest = tag.strip_prefix(&format!("{CACHE_IMAGE_PREFIX}-"))?;
    let (lang, _) = rest.split_once(':')?;
    Some(lang.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    fn handle() -> ContainerHandle {
        ContainerHandle("c1".to_string())
    }

    #[test]
    fn cache_key_is_insensitive_to_package_order() {
        let a = cache_key(Language::Python, &["requests".to_string(), "numpy".to_string()]);
        let b = cache_key(Language::Python, &["numpy".to_string(), "requests".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn cache_key_differs_by_language() {
        let a = cache_key(Language::Python, &["requests".to_string()]);
        let b = cache_key(Language::JavaScript, &["requests".to_string()]);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn miss_then_hit_updates_hit_rate() {
        let engine = Arc::new(MockEngine::new());
        let cache = PackageCache::new(engine.clone());
        let packages = vec!["requests".to_string()];

        let first = cache
            .install(Language::Python, &handle(), &packages, || async { Ok(true) })
            .await
            .unwrap();
        assert!(!first.cached);

        let second = cache
            .install(Language::Python, &handle(), &packages, || async { Ok(true) })
            .await
            .unwrap();
        assert!(second.cached);

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hit_rate, 0.5);
    }
}
