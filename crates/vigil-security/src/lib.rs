// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// vigil-security: Trust evaluation and local secret protection.
//
// Decides whether the device is trustworthy, derives the per-installation
// key material, and encrypts string preferences at rest on top of a plain
// key-value backend.

pub mod cipher;
pub mod integrity;
pub mod keys;
pub mod kv;
pub mod preferences;
pub mod storage;
pub mod trust;

pub use cipher::{Envelope, SecureCipher};
pub use integrity::{fingerprint, hash_bytes};
pub use keys::{KeyMaterial, KeyMaterialProvider};
pub use kv::{KeyValueStore, MemoryKeyValueStore};
pub use preferences::EncryptedPreferenceStore;
pub use storage::SqliteKeyValueStore;
pub use trust::{TrustEvaluator, TrustPolicy};
