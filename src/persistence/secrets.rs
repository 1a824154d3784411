//! Secure secret storage using the OS keyring.
//!
//! Stores service-account keys so they never sit in the config file.

use crate::error::{RelayError, Result};
use keyring::Entry;
use tracing::warn;

const SERVICE_NAME: &str = "bq-relay";

/// Manages keyring storage of service-account keys.
#[derive(Debug, Clone)]
pub struct SecretStorage {
    keyring_available: bool,
}

impl Default for SecretStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStorage {
    /// Creates a new secret storage instance, probing keyring availability.
    pub fn new() -> Self {
        Self {
            keyring_available: Self::probe_keyring(),
        }
    }

    /// Probes whether the OS keyring is available.
    fn probe_keyring() -> bool {
        let test_entry = match Entry::new(SERVICE_NAME, "__probe__") {
            Ok(e) => e,
            Err(_) => return false,
        };

        match test_entry.set_password("test") {
            Ok(()) => {
                let _ = test_entry.delete_credential();
                true
            }
            Err(_) => false,
        }
    }

    /// Returns whether the keyring backend is usable.
    pub fn is_available(&self) -> bool {
        self.keyring_available
    }

    /// Stores a secret under the given key.
    pub fn store(&self, key: &str, secret: &str) -> Result<()> {
        if !self.keyring_available {
            return Err(RelayError::persistence(
                "OS keyring unavailable. Use a key file instead.",
            ));
        }

        let entry = Entry::new(SERVICE_NAME, key)
            .map_err(|e| RelayError::persistence(format!("Failed to create keyring entry: {e}")))?;

        entry
            .set_password(secret)
            .map_err(|e| RelayError::persistence(format!("Failed to store secret: {e}")))?;

        Ok(())
    }

    /// Retrieves a secret, or None when absent or the keyring is unavailable.
    pub fn retrieve(&self, key: &str) -> Result<Option<String>> {
        if !self.keyring_available {
            return Ok(None);
        }

        let entry = Entry::new(SERVICE_NAME, key)
            .map_err(|e| RelayError::persistence(format!("Failed to access keyring: {e}")))?;

        match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(RelayError::persistence(format!(
                "Failed to retrieve secret: {e}"
            ))),
        }
    }

    /// Deletes a secret. Missing entries are not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        if !self.keyring_available {
            return Ok(());
        }

        let entry = Entry::new(SERVICE_NAME, key)
            .map_err(|e| RelayError::persistence(format!("Failed to access keyring: {e}")))?;

        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                warn!("Failed to delete secret from keyring: {e}");
                Ok(())
            }
        }
    }

    /// Generates the keyring key for a profile's service-account key.
    pub fn service_account_key(profile_name: &str) -> String {
        format!("sa-key:{profile_name}")
    }

    /// Masks a secret for display, showing only the last 4 characters.
    pub fn mask_secret(secret: &str) -> String {
        if secret.len() <= 4 {
            "*".repeat(secret.len())
        } else {
            format!("{}...{}", "*".repeat(4), &secret[secret.len() - 4..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret_short() {
        assert_eq!(SecretStorage::mask_secret("abc"), "***");
    }

    #[test]
    fn test_mask_secret_long() {
        assert_eq!(
            SecretStorage::mask_secret("sa-key-material-1234"),
            "****...1234"
        );
    }

    #[test]
    fn test_service_account_key_name() {
        assert_eq!(SecretStorage::service_account_key("prod"), "sa-key:prod");
    }
}
