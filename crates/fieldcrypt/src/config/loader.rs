use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::ServiceConfig;
use crate::error::ConfigError;
use crate::secrets;

const SCHEMA_JSON: &str = include_str!("../../schema/service-config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ServiceConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: ServiceConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &ServiceConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.pipeline.workers == 0 || config.pipeline.chunk_size == 0 {
        return Err(ConfigError::Validation {
            message: "pipeline.workers and pipeline.chunk_size must be positive".to_string(),
        });
    }

    if config.jobs.max_concurrent_jobs == 0 || config.jobs.queue_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "jobs.max_concurrent_jobs and jobs.queue_capacity must be positive"
                .to_string(),
        });
    }

    let Some(transform) = &config.transform else {
        return Ok(());
    };

    let mut names = HashSet::new();
    for policy in &transform.policies {
        if !names.insert(policy.name.as_str()) {
            return Err(ConfigError::InvalidPolicy {
                name: policy.name.clone(),
                reason: "Duplicate policy name".to_string(),
            });
        }

        if !secrets::has_secret_source(
            policy.key.as_deref(),
            policy.key_file.as_deref(),
            policy.key_env_var.as_deref(),
        ) {
            return Err(ConfigError::InvalidPolicy {
                name: policy.name.clone(),
                reason: "One of key, key_file or key_env_var is required".to_string(),
            });
        }
    }

    if let Some(default_policy) = &transform.default_policy {
        if !names.contains(default_policy.as_str()) {
            return Err(ConfigError::InvalidPolicy {
                name: default_policy.clone(),
                reason: "default_policy does not name a configured policy".to_string(),
            });
        }
    }

    Ok(())
}
