//! Gemini API key lookup and secure storage.
//!
//! The key is read from `GEMINI_API_KEY` (or `API_KEY`) first, then from the
//! OS's native secret storage:
//! - Linux: libsecret (GNOME Keyring/KDE Wallet)
//! - macOS: Keychain
//! - Windows: Credential Manager
//!
//! Never log the key value.

use keyring::Entry;

const SERVICE_NAME: &str = "kazilens";
const API_KEY_NAME: &str = "gemini-api-key";

/// Environment variables checked in order
const ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Where the active key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment(&'static str),
    Keyring,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Environment(var) => write!(f, "environment variable {}", var),
            KeySource::Keyring => write!(f, "system keyring"),
        }
    }
}

fn key_from_env() -> Option<(String, KeySource)> {
    ENV_VARS.iter().find_map(|var| {
        std::env::var(var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(|k| (k.trim().to_string(), KeySource::Environment(var)))
    })
}

/// Retrieve the stored key, if any.
/// Returns None if not configured or on error (errors are logged).
fn key_from_keyring() -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, API_KEY_NAME) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("ApiKey: failed to create keyring entry: {}", e);
            return None;
        }
    };

    match entry.get_password() {
        Ok(key) if key.is_empty() => None,
        Ok(key) => Some(key),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            log::warn!("ApiKey: failed to retrieve key: {}", e);
            None
        }
    }
}

/// Resolve the key and where it came from
pub fn resolve_api_key() -> Option<(String, KeySource)> {
    key_from_env().or_else(|| key_from_keyring().map(|k| (k, KeySource::Keyring)))
}

pub fn get_api_key() -> Option<String> {
    resolve_api_key().map(|(key, _)| key)
}

/// Store the key in the system keyring.
/// Pass None to delete the key.
pub fn set_api_key(key: Option<&str>) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, API_KEY_NAME)
        .map_err(|e| format!("Failed to create keyring entry: {}", e))?;

    match key.map(str::trim) {
        Some(k) if !k.is_empty() => {
            entry
                .set_password(k)
                .map_err(|e| format!("Failed to store API key: {}", e))?;
            log::info!("ApiKey: stored new API key");
        }
        _ => match entry.delete_credential() {
            Ok(()) => log::info!("ApiKey: deleted API key"),
            // Already deleted
            Err(keyring::Error::NoEntry) => {}
            Err(e) => return Err(format!("Failed to delete API key: {}", e)),
        },
    }

    Ok(())
}

/// Masked version of a key for display (e.g., "AIz...Xy12ab")
pub fn mask_key(key: &str) -> String {
    if key.len() <= 8 {
        "*".repeat(key.len())
    } else {
        format!("{}...{}", &key[..3], &key[key.len() - 6..])
    }
}
