//! A single idle, pooled container and its bookkeeping fields.

use std::time::Instant;

use crate::engine::ContainerHandle;
use crate::language::Language;

#[derive(Debug, Clone)]
pub struct PooledContainer {
    pub handle: ContainerHandle,
    pub language: Language,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub use_count: u64,
    pub healthy: bool,
}

impl PooledContainer {
    pub fn new(handle: ContainerHandle, language: Language) -> Self {
        let now = Instant::now();
        Self {
            handle,
            language,
            created_at: now,
            last_used_at: now,
            use_count: 0,
            healthy: true,
        }
    }

    pub fn touch(&mut self) {
        self.last_used_at = Instant::now();
        self.use_count += 1;
    }
}
