//! Built-in field transform backed by per-policy AES-256-GCM keys.
//!
//! Protected values are `base64(nonce || ciphertext)` so they stay safe
//! inside delimited text.

use std::collections::HashMap;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secrecy::ExposeSecret;

use super::FieldTransform;
use crate::config::TransformSettings;
use crate::error::{ConfigError, TransformError};
use crate::secrets;

/// Nonce size for AES-256-GCM (96 bits).
const NONCE_SIZE: usize = 12;

struct PolicyKey {
    cipher: Aes256Gcm,
    reveal_users: Vec<String>,
}

pub struct PolicyCipher {
    policies: HashMap<String, PolicyKey>,
    user_name: Option<String>,
}

impl PolicyCipher {
    pub fn new(user_name: Option<String>) -> Self {
        Self {
            policies: HashMap::new(),
            user_name,
        }
    }

    /// Builds the cipher from settings, resolving every policy key.
    pub fn from_settings(settings: &TransformSettings) -> Result<Self, ConfigError> {
        let mut cipher = Self::new(settings.user_name.clone());

        for policy in &settings.policies {
            let key = secrets::resolve_key(
                policy.key.as_deref(),
                policy.key_file.as_deref(),
                policy.key_env_var.as_deref(),
            )
            .map_err(|e| ConfigError::InvalidPolicy {
                name: policy.name.clone(),
                reason: e.to_string(),
            })?;

            cipher.add_policy(&policy.name, key.expose_secret(), policy.reveal_users.clone())?;
        }

        Ok(cipher)
    }

    pub fn add_policy(
        &mut self,
        name: &str,
        key: &[u8],
        reveal_users: Vec<String>,
    ) -> Result<(), ConfigError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| ConfigError::InvalidPolicy {
            name: name.to_string(),
            reason: format!("Failed to create cipher: {}", e),
        })?;

        self.policies.insert(
            name.to_string(),
            PolicyKey {
                cipher,
                reveal_users,
            },
        );
        Ok(())
    }

    pub fn policy_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.keys().cloned().collect();
        names.sort();
        names
    }

    fn key(&self, policy: &str) -> Result<&PolicyKey, TransformError> {
        self.policies
            .get(policy)
            .ok_or_else(|| TransformError::UnknownPolicy(policy.to_string()))
    }
}

impl FieldTransform for PolicyCipher {
    fn protect(&self, plaintext: &str, policy: &str) -> Result<String, TransformError> {
        let key = self.key(policy)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = key
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| TransformError::Backend(format!("Encryption failed: {}", e)))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(nonce.as_slice());
        combined.extend(ciphertext);

        Ok(BASE64.encode(combined))
    }

    fn reveal(&self, ciphertext: &str, policy: &str) -> Result<String, TransformError> {
        let key = self.key(policy)?;

        if !key.reveal_users.is_empty() {
            let user = self.user_name.as_deref().unwrap_or_default();
            if !key.reveal_users.iter().any(|u| u == user) {
                return Err(TransformError::Unauthorized {
                    user: user.to_string(),
                    policy: policy.to_string(),
                });
            }
        }

        let combined = BASE64
            .decode(ciphertext.trim())
            .map_err(|e| TransformError::Backend(format!("Invalid ciphertext encoding: {}", e)))?;

        if combined.len() < NONCE_SIZE {
            return Err(TransformError::Backend("Ciphertext too short".to_string()));
        }

        let (nonce_bytes, sealed) = combined.split_at(NONCE_SIZE);
        let plaintext = key
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|e| TransformError::Backend(format!("Decryption failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| TransformError::Backend(format!("Invalid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicySettings;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn cipher_for(user: Option<&str>, reveal_users: &[&str]) -> PolicyCipher {
        let settings = TransformSettings {
            user_name: user.map(str::to_string),
            default_policy: None,
            preflight: true,
            policies: vec![PolicySettings {
                name: "pii".to_string(),
                key: Some(TEST_KEY.to_string()),
                reveal_users: reveal_users.iter().map(|u| u.to_string()).collect(),
                ..Default::default()
            }],
        };
        PolicyCipher::from_settings(&settings).unwrap()
    }

    #[test]
    fn test_protect_then_reveal_restores_plaintext() {
        let cipher = cipher_for(None, &[]);
        let protected = cipher.protect("4111-1111-1111-1111", "pii").unwrap();
        assert_ne!(protected, "4111-1111-1111-1111");
        assert!(!protected.contains(','));
        assert_eq!(cipher.reveal(&protected, "pii").unwrap(), "4111-1111-1111-1111");
    }

    #[test]
    fn test_protect_uses_fresh_nonce() {
        let cipher = cipher_for(None, &[]);
        let a = cipher.protect("same", "pii").unwrap();
        let b = cipher.protect("same", "pii").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unicode_roundtrip() {
        let cipher = cipher_for(None, &[]);
        let plaintext = "Zażółć gęślą jaźń 🔐";
        let protected = cipher.protect(plaintext, "pii").unwrap();
        assert_eq!(cipher.reveal(&protected, "pii").unwrap(), plaintext);
    }

    #[test]
    fn test_unknown_policy() {
        let cipher = cipher_for(None, &[]);
        assert_eq!(
            cipher.protect("x", "nope"),
            Err(TransformError::UnknownPolicy("nope".to_string()))
        );
    }

    #[test]
    fn test_reveal_requires_listed_user() {
        let owner = cipher_for(Some("alice"), &["alice"]);
        let protected = owner.protect("secret", "pii").unwrap();
        assert_eq!(owner.reveal(&protected, "pii").unwrap(), "secret");

        let stranger = cipher_for(Some("mallory"), &["alice"]);
        assert!(matches!(
            stranger.reveal(&protected, "pii"),
            Err(TransformError::Unauthorized { .. })
        ));

        let anonymous = cipher_for(None, &["alice"]);
        assert!(matches!(
            anonymous.reveal(&protected, "pii"),
            Err(TransformError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_reveal_rejects_garbage() {
        let cipher = cipher_for(None, &[]);
        assert!(matches!(
            cipher.reveal("not base64!", "pii"),
            Err(TransformError::Backend(_))
        ));
        assert!(matches!(
            cipher.reveal("AAAA", "pii"),
            Err(TransformError::Backend(_))
        ));

        let mut tampered = BASE64.decode(cipher.protect("test", "pii").unwrap()).unwrap();
        if let Some(byte) = tampered.last_mut() {
            *byte ^= 0xff;
        }
        assert!(matches!(
            cipher.reveal(&BASE64.encode(tampered), "pii"),
            Err(TransformError::Backend(_))
        ));
    }

    #[test]
    fn test_from_settings_reports_bad_key() {
        let settings = TransformSettings {
            policies: vec![PolicySettings {
                name: "pii".to_string(),
                key: Some("abcd".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            PolicyCipher::from_settings(&settings),
            Err(ConfigError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn test_policy_names_sorted() {
        let mut cipher = PolicyCipher::new(None);
        cipher.add_policy("zeta", &[7u8; 32], vec![]).unwrap();
        cipher.add_policy("alpha", &[9u8; 32], vec![]).unwrap();
        assert_eq!(cipher.policy_names(), vec!["alpha", "zeta"]);
    }
}
