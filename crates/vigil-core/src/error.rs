// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Vigil.

use thiserror::Error;

/// Top-level error type for all Vigil operations.
#[derive(Debug, Error)]
pub enum VigilError {
    // -- Probe errors --
    #[error("integrity probe failed: {0}")]
    Probe(String),

    // -- Key derivation errors --
    #[error("native secret unavailable: {0}")]
    NativeSecret(String),

    #[error("secure storage error: {0}")]
    SecureStorage(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    // -- Cipher errors --
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("integrity check failed: ciphertext was modified or the key is wrong")]
    IntegrityMismatch,

    // -- Storage / persistence --
    #[error("preference store error: {0}")]
    Preferences(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Platform bridge --
    #[error("platform bridge error: {0}")]
    Bridge(String),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, VigilError>;
