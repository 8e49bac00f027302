//! Field transform port: the per-field protect/reveal capability the
//! pipeline drives.

pub mod cipher;
pub mod client;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use crate::error::TransformError;
pub use cipher::PolicyCipher;
pub use client::TransformClient;

/// A policy-keyed, reversible transform of a single field value.
pub trait FieldTransform: Send + Sync {
    fn protect(&self, plaintext: &str, policy: &str) -> Result<String, TransformError>;

    fn reveal(&self, ciphertext: &str, policy: &str) -> Result<String, TransformError>;

    /// Dispatches on `mode`.
    fn apply(&self, mode: Mode, value: &str, policy: &str) -> Result<String, TransformError> {
        match mode {
            Mode::Protect => self.protect(value, policy),
            Mode::Reveal => self.reveal(value, policy),
        }
    }
}

/// Backend used before the client is configured. Every call fails.
pub struct Unconfigured;

impl FieldTransform for Unconfigured {
    fn protect(&self, _plaintext: &str, _policy: &str) -> Result<String, TransformError> {
        Err(TransformError::NotConfigured)
    }

    fn reveal(&self, _ciphertext: &str, _policy: &str) -> Result<String, TransformError> {
        Err(TransformError::NotConfigured)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Protect,
    Reveal,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Protect => "protect",
            Mode::Reveal => "reveal",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = crate::error::RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "protect" => Ok(Mode::Protect),
            "reveal" => Ok(Mode::Reveal),
            _ => Err(crate::error::RequestError::UnknownMode(s.to_string())),
        }
    }
}
