// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Security configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{CipherStrategy, KeyDerivation};

/// Persistent security settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Production mode: developer options count as a compromise signal.
    pub hardened: bool,
    /// Also query the secondary (obfuscated) native channel.
    pub query_secondary_channel: bool,
    /// How key material is derived from the native and random secrets.
    pub key_derivation: KeyDerivation,
    /// Envelope format for encrypted values.
    pub cipher_strategy: CipherStrategy,
    /// Initial state of the preference store's encryption flag.
    pub encrypt_preferences: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            hardened: true,
            query_secondary_channel: true,
            key_derivation: KeyDerivation::Hkdf,
            cipher_strategy: CipherStrategy::StreamMac,
            encrypt_preferences: false,
        }
    }
}

impl SecurityConfig {
    /// Settings for debug/testing builds: developer mode is tolerated.
    pub fn development() -> Self {
        Self {
            hardened: false,
            ..Self::default()
        }
    }

    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Write settings as pretty-printed JSON.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_hardened_and_unencrypted() {
        let config = SecurityConfig::default();
        assert!(config.hardened);
        assert!(!config.encrypt_preferences);
        assert_eq!(config.key_derivation, KeyDerivation::Hkdf);
        assert!(!SecurityConfig::development().hardened);
    }

    #[test]
    fn persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = SecurityConfig {
            cipher_strategy: CipherStrategy::AeadBlock,
            encrypt_preferences: true,
            ..SecurityConfig::development()
        };
        config.persist(&path).unwrap();

        assert_eq!(SecurityConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "hardened": false }"#).unwrap();

        let config = SecurityConfig::load(&path).unwrap();
        assert!(!config.hardened);
        assert!(config.query_secondary_channel);
    }
}
