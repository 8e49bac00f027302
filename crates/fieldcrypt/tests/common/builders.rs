//! Builder patterns for creating test configurations.

#![allow(dead_code)]

use std::path::Path;

use fieldcrypt::config::{PolicySettings, ServiceConfig, TransformSettings};

/// Hex encoding of a 32 byte key filled with `byte`.
pub fn hex_key(byte: u8) -> String {
    format!("{:02x}", byte).repeat(32)
}

/// Builder for creating `ServiceConfig` instances.
pub struct ConfigBuilder {
    config: ServiceConfig,
    transform: Option<TransformSettings>,
}

impl ConfigBuilder {
    /// Small pools and chunks so tests exercise several drains.
    pub fn new(work_dir: &Path) -> Self {
        let mut config = ServiceConfig::default();
        config.pipeline.workers = 4;
        config.pipeline.chunk_size = 3;
        config.jobs.max_concurrent_jobs = 2;
        config.jobs.queue_capacity = 8;
        config.jobs.work_dir = work_dir.to_path_buf();
        Self {
            config,
            transform: None,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.pipeline.workers = workers;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.pipeline.chunk_size = chunk_size;
        self
    }

    pub fn jobs(mut self, max_concurrent_jobs: usize, queue_capacity: usize) -> Self {
        self.config.jobs.max_concurrent_jobs = max_concurrent_jobs;
        self.config.jobs.queue_capacity = queue_capacity;
        self
    }

    pub fn ttl_seconds(mut self, ttl: u64) -> Self {
        self.config.results.ttl_seconds = ttl;
        self
    }

    pub fn user(mut self, user: &str) -> Self {
        self.transform_mut().user_name = Some(user.to_string());
        self
    }

    pub fn default_policy(mut self, policy: &str) -> Self {
        self.transform_mut().default_policy = Some(policy.to_string());
        self
    }

    pub fn preflight(mut self, enabled: bool) -> Self {
        self.transform_mut().preflight = enabled;
        self
    }

    /// Adds a policy with an inline hex key.
    pub fn policy(mut self, name: &str, key_byte: u8, reveal_users: &[&str]) -> Self {
        self.transform_mut().policies.push(PolicySettings {
            name: name.to_string(),
            key: Some(hex_key(key_byte)),
            reveal_users: reveal_users.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        });
        self
    }

    pub fn transform_settings(&self) -> Option<TransformSettings> {
        self.transform.clone()
    }

    pub fn build(self) -> ServiceConfig {
        let mut config = self.config;
        config.transform = self.transform;
        config
    }

    fn transform_mut(&mut self) -> &mut TransformSettings {
        self.transform.get_or_insert_with(|| TransformSettings {
            preflight: true,
            ..Default::default()
        })
    }
}
