//! Persistent settings store
//!
//! Durable key/value preferences grouped under a namespace. Each `set` is a
//! single autocommit upsert, so the value is on disk before the call returns.
//! Keys are independent; readers must tolerate a partially updated pair.

use rusqlite::OptionalExtension;
use secrecy::{ExposeSecret, SecretString};

use crate::db::DbPool;
use crate::{Error, Result};

/// Default preference namespace
pub const DEFAULT_NAMESPACE: &str = "jarvis_prefs";

/// Key holding the user's "should the listener run" intent
pub const KEY_ENABLED: &str = "wake_word_enabled";

/// Key holding the detector engine credential
pub const KEY_CREDENTIAL: &str = "picovoice_access_key";

/// Snapshot of the persisted wake settings
#[derive(Debug, Clone)]
pub struct WakeSettings {
    /// User intent: should the listener run
    pub enabled: bool,
    /// Engine credential, empty if never saved
    pub credential: SecretString,
}

impl WakeSettings {
    /// Whether a usable credential is present
    #[must_use]
    pub fn has_credential(&self) -> bool {
        !self.credential.expose_secret().trim().is_empty()
    }
}

/// Namespaced preferences backed by `SQLite`
#[derive(Clone)]
pub struct SettingsStore {
    db: DbPool,
    namespace: String,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl SettingsStore {
    /// Create a store over the given pool and namespace
    #[must_use]
    pub fn new(db: DbPool, namespace: impl Into<String>) -> Self {
        Self {
            db,
            namespace: namespace.into(),
        }
    }

    /// The namespace this store reads and writes
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Read a raw value
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.db.get().map_err(|e| Error::Database(e.to_string()))?;
        let value = conn
            .query_row(
                "SELECT value FROM preferences WHERE namespace = ?1 AND key = ?2",
                rusqlite::params![self.namespace, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Read a value, falling back to `default` when the key is absent
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.get(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// Write a value, committed before return
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.db.get().map_err(|e| Error::Database(e.to_string()))?;
        conn.execute(
            "INSERT INTO preferences (namespace, key, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            rusqlite::params![self.namespace, key, value],
        )?;
        Ok(())
    }

    /// Read a boolean, falling back to `default` when absent or unparsable
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        let Some(raw) = self.get(key)? else {
            return Ok(default);
        };
        match raw.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => {
                tracing::warn!(key, value = other, "unparsable boolean preference, using default");
                Ok(default)
            }
        }
    }

    /// Write a boolean
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, if value { "true" } else { "false" })
    }

    /// Persisted user intent
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn enabled(&self) -> Result<bool> {
        self.get_bool(KEY_ENABLED, false)
    }

    /// Persist user intent
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.set_bool(KEY_ENABLED, enabled)?;
        tracing::debug!(enabled, "persisted enabled flag");
        Ok(())
    }

    /// Persisted credential, empty if never saved
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn credential(&self) -> Result<SecretString> {
        Ok(SecretString::from(self.get_or(KEY_CREDENTIAL, "")?))
    }

    /// Persist the credential
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn set_credential(&self, credential: &SecretString) -> Result<()> {
        self.set(KEY_CREDENTIAL, credential.expose_secret())?;
        tracing::debug!(credential = %mask(credential), "persisted credential");
        Ok(())
    }

    /// Read both wake keys
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn snapshot(&self) -> Result<WakeSettings> {
        Ok(WakeSettings {
            enabled: self.enabled()?,
            credential: self.credential()?,
        })
    }
}

/// Render a credential for logs: at most the first four characters survive
#[must_use]
pub fn mask(credential: &SecretString) -> String {
    let raw = credential.expose_secret();
    if raw.is_empty() {
        return "<empty>".to_string();
    }
    let chars = raw.chars().count();
    if chars <= 8 {
        return "****".to_string();
    }
    let prefix: String = raw.chars().take(4).collect();
    format!("{prefix}****")
}
