use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub version: String,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub jobs: JobSettings,
    #[serde(default)]
    pub results: ResultSettings,
    #[serde(default)]
    pub logging: LogSettings,
    #[serde(default)]
    pub transform: Option<TransformSettings>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            pipeline: PipelineSettings::default(),
            jobs: JobSettings::default(),
            results: ResultSettings::default(),
            logging: LogSettings::default(),
            transform: None,
        }
    }
}

/// Per-job concurrency knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Number of line workers per job.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum number of submitted but unwritten lines.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_max_concurrent_jobs() -> usize {
    num_cpus::get()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_work_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("fieldcrypt")
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            queue_capacity: default_queue_capacity(),
            work_dir: default_work_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSettings {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_max_entries() -> u64 {
    1024
}

impl Default for ResultSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "fieldcrypt=info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

/// Settings for the built-in policy cipher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformSettings {
    /// Principal used for reveal authorization.
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub default_policy: Option<String>,
    /// Run one sample transform before accepting a job.
    #[serde(default = "default_true")]
    pub preflight: bool,
    #[serde(default)]
    pub policies: Vec<PolicySettings>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySettings {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_env_var: Option<String>,
    /// Users allowed to reveal. Empty means everyone.
    #[serde(default)]
    pub reveal_users: Vec<String>,
}

impl TransformSettings {
    /// Copy safe to hand to a UI: inline keys are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for policy in &mut copy.policies {
            if policy.key.is_some() {
                policy.key = Some("****".to_string());
            }
        }
        copy
    }

    pub fn policy(&self, name: &str) -> Option<&PolicySettings> {
        self.policies.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: ServiceConfig = serde_json::from_str(r#"{"version":"1.0"}"#).unwrap();
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.pipeline.chunk_size, 1000);
        assert_eq!(config.jobs.queue_capacity, 64);
        assert!(config.jobs.max_concurrent_jobs > 0);
        assert!(config.jobs.work_dir.ends_with("fieldcrypt"));
        assert_eq!(config.results.ttl_seconds, 3600);
        assert!(config.transform.is_none());
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_transform_settings_redacted() {
        let settings = TransformSettings {
            user_name: Some("alice".to_string()),
            default_policy: Some("pii".to_string()),
            preflight: true,
            policies: vec![PolicySettings {
                name: "pii".to_string(),
                key: Some("00".repeat(32)),
                ..Default::default()
            }],
        };

        let redacted = settings.redacted();
        assert_eq!(redacted.policies[0].key.as_deref(), Some("****"));
        assert_eq!(redacted.user_name.as_deref(), Some("alice"));
        assert!(settings.policy("pii").is_some());
        assert!(settings.policy("other").is_none());
    }

    #[test]
    fn test_preflight_defaults_to_true() {
        let settings: TransformSettings = serde_json::from_str(r#"{"policies":[]}"#).unwrap();
        assert!(settings.preflight);
    }
}
