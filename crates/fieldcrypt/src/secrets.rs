//! Resolution of policy key material.
//!
//! A policy key may be given in one of three places, checked in this order:
//!
//! 1. **Inline value** - convenient for local testing (`"key": "<64 hex chars>"`)
//! 2. **File reference** - Docker secrets style (`"key_file": "/run/secrets/pii-key"`)
//! 3. **Env var reference** - Kubernetes style (`"key_env_var": "FIELDCRYPT_PII_KEY"`)

use secrecy::{ExposeSecret, SecretBox, SecretString};
use std::fs;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No key source provided (need one of: key, key_file or key_env_var)")]
    NoSourceProvided,

    #[error("Failed to read key from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from the first non-empty source.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        return fs::read_to_string(&expanded)
            .map(|content| SecretString::from(content.trim().to_string()))
            .map_err(|e| SecretError::FileReadError {
                path: expanded,
                source: e,
            });
    }

    if let Some(var_name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(var_name) {
            Ok(value) => Ok(SecretString::from(value.trim())),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: var_name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: var_name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Resolves and decodes a hex-encoded AES-256 key.
pub fn resolve_key(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretBox<[u8; KEY_LEN]>> {
    let secret = resolve_secret(direct, file_path, env_var)?;
    decode_key(secret.expose_secret())
}

/// Decodes a 64 character hex string into key bytes.
pub fn decode_key(key_hex: &str) -> Result<SecretBox<[u8; KEY_LEN]>> {
    let bytes =
        hex_decode(key_hex).map_err(|e| SecretError::InvalidKey(format!("Invalid hex key: {}", e)))?;

    let key: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
        SecretError::InvalidKey(format!(
            "Key must be {} bytes ({} hex chars), got {} bytes",
            KEY_LEN,
            KEY_LEN * 2,
            bytes.len()
        ))
    })?;

    Ok(SecretBox::new(Box::new(key)))
}

/// Returns true if at least one key source is non-empty.
pub fn has_secret_source(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> bool {
    direct.is_some_and(|s| !s.is_empty())
        || file_path.is_some_and(|s| !s.is_empty())
        || env_var.is_some_and(|s| !s.is_empty())
}

/// Expands a leading `~` to the current user's home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

fn hex_decode(hex: &str) -> std::result::Result<Vec<u8>, String> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return Err("Hex string must have even length".to_string());
    }
    if !hex.is_ascii() {
        return Err("Hex string must be ASCII".to_string());
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| format!("Invalid hex at position {}: {}", i, e))
        })
        .collect()
}
