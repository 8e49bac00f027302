//! Field transform doubles.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use fieldcrypt::{FieldTransform, TransformError};

/// Reversible fake: protect reverses the value and tags it with the policy.
pub struct MirrorTransform;

impl FieldTransform for MirrorTransform {
    fn protect(&self, plaintext: &str, policy: &str) -> Result<String, TransformError> {
        Ok(format!("{}~{}", policy, plaintext.chars().rev().collect::<String>()))
    }

    fn reveal(&self, ciphertext: &str, policy: &str) -> Result<String, TransformError> {
        ciphertext
            .strip_prefix(&format!("{}~", policy))
            .map(|rest| rest.chars().rev().collect())
            .ok_or_else(|| TransformError::Backend("not mirrored".to_string()))
    }
}

/// Every call fails like an unreachable backend.
pub struct AlwaysFail;

impl FieldTransform for AlwaysFail {
    fn protect(&self, _plaintext: &str, _policy: &str) -> Result<String, TransformError> {
        Err(TransformError::Backend("connection refused".to_string()))
    }

    fn reveal(&self, _ciphertext: &str, _policy: &str) -> Result<String, TransformError> {
        Err(TransformError::Backend("connection refused".to_string()))
    }
}

/// Panics on one value; uppercases everything else.
pub struct PanicOnValue(pub &'static str);

impl FieldTransform for PanicOnValue {
    fn protect(&self, plaintext: &str, _policy: &str) -> Result<String, TransformError> {
        if plaintext == self.0 {
            panic!("backend crashed");
        }
        Ok(plaintext.to_uppercase())
    }

    fn reveal(&self, ciphertext: &str, policy: &str) -> Result<String, TransformError> {
        self.protect(ciphertext, policy)
    }
}

/// Fails on one value; uppercases everything else.
pub struct FailOnValue(pub &'static str);

impl FieldTransform for FailOnValue {
    fn protect(&self, plaintext: &str, _policy: &str) -> Result<String, TransformError> {
        if plaintext == self.0 {
            return Err(TransformError::Backend(format!("rejected {}", plaintext)));
        }
        Ok(plaintext.to_uppercase())
    }

    fn reveal(&self, ciphertext: &str, policy: &str) -> Result<String, TransformError> {
        self.protect(ciphertext, policy)
    }
}

/// Passes values through and counts calls.
#[derive(Default)]
pub struct CountingTransform {
    calls: AtomicUsize,
}

impl CountingTransform {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FieldTransform for CountingTransform {
    fn protect(&self, plaintext: &str, _policy: &str) -> Result<String, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(plaintext.to_string())
    }

    fn reveal(&self, ciphertext: &str, policy: &str) -> Result<String, TransformError> {
        self.protect(ciphertext, policy)
    }
}
