use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{error, info, warn};

use super::{FieldTransform, PolicyCipher, Unconfigured};
use crate::config::TransformSettings;
use crate::error::{ConfigError, TransformError};

struct ClientState {
    backend: Arc<dyn FieldTransform>,
    settings: Option<TransformSettings>,
    configured: bool,
}

/// Shared handle to the active field transform backend.
///
/// Jobs take a [`snapshot`](Self::snapshot) when they start; a later
/// [`reconfigure`](Self::reconfigure) only affects jobs started after it.
pub struct TransformClient {
    state: RwLock<ClientState>,
}

impl TransformClient {
    /// Creates a client that rejects every call until configured.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ClientState {
                backend: Arc::new(Unconfigured),
                settings: None,
                configured: false,
            }),
        }
    }

    /// Creates a client from optional startup settings.
    ///
    /// A configuration failure is logged and leaves the client unconfigured,
    /// so the service can still start and be configured later.
    pub fn from_settings(settings: Option<&TransformSettings>) -> Self {
        let client = Self::new();
        match settings {
            Some(settings) => {
                if let Err(e) = client.configure(settings.clone()) {
                    error!("Failed to initialize transform client: {}", e);
                }
            }
            None => warn!("Transform client initialization skipped: no transform settings"),
        }
        client
    }

    /// Creates a client around an existing backend.
    pub fn with_backend(backend: Arc<dyn FieldTransform>) -> Self {
        Self {
            state: RwLock::new(ClientState {
                backend,
                settings: None,
                configured: true,
            }),
        }
    }

    /// First-time setup; identical to [`reconfigure`](Self::reconfigure).
    pub fn configure(&self, settings: TransformSettings) -> Result<(), ConfigError> {
        self.reconfigure(settings)
    }

    /// Builds a new cipher from `settings` and swaps it in.
    ///
    /// On error the previous backend stays active.
    pub fn reconfigure(&self, settings: TransformSettings) -> Result<(), ConfigError> {
        let cipher = PolicyCipher::from_settings(&settings)?;
        info!(
            "Transform client configured with policies: {:?}",
            cipher.policy_names()
        );

        let mut state = self.write_state();
        state.backend = Arc::new(cipher);
        state.settings = Some(settings);
        state.configured = true;
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.read_state().configured
    }

    /// Backend to use for the whole of one job.
    pub fn snapshot(&self) -> Arc<dyn FieldTransform> {
        Arc::clone(&self.read_state().backend)
    }

    /// Active settings with inline keys masked.
    pub fn settings_view(&self) -> Option<TransformSettings> {
        self.read_state().settings.as_ref().map(|s| s.redacted())
    }

    pub fn default_policy(&self) -> Option<String> {
        self.read_state()
            .settings
            .as_ref()
            .and_then(|s| s.default_policy.clone())
    }

    /// Pre-flight checks run unless settings turn them off.
    pub fn preflight_enabled(&self) -> bool {
        self.read_state()
            .settings
            .as_ref()
            .map(|s| s.preflight)
            .unwrap_or(true)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ClientState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Transform client lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ClientState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Transform client lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for TransformClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldTransform for TransformClient {
    fn protect(&self, plaintext: &str, policy: &str) -> Result<String, TransformError> {
        self.snapshot().protect(plaintext, policy)
    }

    fn reveal(&self, ciphertext: &str, policy: &str) -> Result<String, TransformError> {
        self.snapshot().reveal(ciphertext, policy)
    }
}
