// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Encrypted preference store: transparent string encryption over a plain
// key-value backend.
//
//   write path: string / string list -> cipher (when enabled) -> backend
//               bool / int / double  -> backend
//   read path:  backend -> cipher.decrypt (when a cipher exists)
//                       -> on failure, the raw stored string (legacy plaintext)
//
// This is the only place a decryption failure is swallowed. Every public
// call is total: reads return `None` on backend failure, mutators `false`.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use vigil_core::SecurityConfig;
use vigil_core::types::CipherStrategy;
use zeroize::Zeroizing;

use crate::cipher::SecureCipher;
use crate::keys::{IV_LEN, KEY_LEN, normalize};
use crate::kv::KeyValueStore;

#[derive(Default)]
struct EncryptionState {
    enabled: bool,
    cipher: Option<Arc<SecureCipher>>,
    key: Option<Zeroizing<[u8; KEY_LEN]>>,
    iv: Option<[u8; IV_LEN]>,
}

impl EncryptionState {
    /// Rebuild the cipher from the configured key and IV. The IV defaults to
    /// the leading bytes of the key. Without a caller key, an IV change is
    /// applied to the installed cipher.
    fn rebuild(&mut self, strategy: CipherStrategy) {
        if let Some(key) = &self.key {
            let iv = self.iv.unwrap_or_else(|| normalize::<IV_LEN>(key.as_slice()));
            self.cipher = Some(Arc::new(SecureCipher::from_parts(**key, iv, strategy)));
        } else if let (Some(cipher), Some(iv)) = (&self.cipher, self.iv) {
            self.cipher = Some(Arc::new(cipher.with_iv(iv)));
        }
    }

    fn active(&self) -> Option<Arc<SecureCipher>> {
        if self.enabled {
            self.cipher.clone()
        } else {
            None
        }
    }
}

/// Preference store that encrypts string values before they reach the
/// backend.
///
/// Encryption starts disabled. Booleans and numbers are never encrypted.
pub struct EncryptedPreferenceStore {
    inner: Arc<dyn KeyValueStore>,
    strategy: CipherStrategy,
    state: RwLock<EncryptionState>,
}

impl EncryptedPreferenceStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner,
            strategy: CipherStrategy::default(),
            state: RwLock::new(EncryptionState::default()),
        }
    }

    /// Store driven by a cipher built from [`KeyMaterial`](crate::keys::KeyMaterial).
    pub fn with_cipher(inner: Arc<dyn KeyValueStore>, cipher: Arc<SecureCipher>, enabled: bool) -> Self {
        let strategy = cipher.strategy();
        Self {
            inner,
            strategy,
            state: RwLock::new(EncryptionState {
                enabled,
                cipher: Some(cipher),
                key: None,
                iv: None,
            }),
        }
    }

    /// Store set up from `config`: its cipher strategy for caller-supplied
    /// keys and its initial encryption flag.
    pub fn from_config(
        inner: Arc<dyn KeyValueStore>,
        cipher: Option<Arc<SecureCipher>>,
        config: &SecurityConfig,
    ) -> Self {
        if config.encrypt_preferences && cipher.is_none() {
            warn!("encryption requested but no key is configured; values stay in plaintext");
        }
        Self {
            inner,
            strategy: config.cipher_strategy,
            state: RwLock::new(EncryptionState {
                enabled: config.encrypt_preferences,
                cipher,
                key: None,
                iv: None,
            }),
        }
    }

    /// Strategy used for ciphers built from caller-supplied keys.
    pub fn with_strategy(mut self, strategy: CipherStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The backend this store writes to.
    pub fn inner(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner
    }

    /// Install a caller-managed key. Its UTF-8 bytes are truncated or padded
    /// to the cipher key length. The current IV is kept.
    #[instrument(skip_all)]
    pub async fn set_encryption_key(&self, key: &str) {
        let mut state = self.state.write().await;
        if state.iv.is_none() {
            state.iv = state.cipher.as_ref().map(|cipher| *cipher.iv());
        }
        state.key = Some(Zeroizing::new(normalize::<KEY_LEN>(key.as_bytes())));
        state.rebuild(self.strategy);
        debug!("preference encryption key replaced");
    }

    /// Install a caller-managed IV. Applies to the current cipher, or to the
    /// next key when none is installed yet.
    #[instrument(skip_all)]
    pub async fn set_encryption_iv(&self, iv: &str) {
        let mut state = self.state.write().await;
        state.iv = Some(normalize::<IV_LEN>(iv.as_bytes()));
        state.rebuild(self.strategy);
    }

    /// Key, IV and flag in one step.
    pub async fn initialize_encryption(&self, key: &str, iv: &str, enable: bool) {
        {
            let mut state = self.state.write().await;
            state.key = Some(Zeroizing::new(normalize::<KEY_LEN>(key.as_bytes())));
            state.iv = Some(normalize::<IV_LEN>(iv.as_bytes()));
            state.rebuild(self.strategy);
        }
        self.set_encryption_enabled(enable).await;
    }

    pub async fn set_encryption_enabled(&self, enabled: bool) {
        let mut state = self.state.write().await;
        if enabled && state.cipher.is_none() {
            warn!("encryption requested but no key is configured; values stay in plaintext");
        }
        state.enabled = enabled;
    }

    /// True only when writes are actually being encrypted.
    pub async fn is_encryption_enabled(&self) -> bool {
        self.state.read().await.active().is_some()
    }

    async fn write_cipher(&self) -> Option<Arc<SecureCipher>> {
        self.state.read().await.active()
    }

    async fn read_cipher(&self) -> Option<Arc<SecureCipher>> {
        self.state.read().await.cipher.clone()
    }

    fn seal(cipher: Option<&SecureCipher>, key: &str, value: &str) -> Option<String> {
        match cipher {
            None => Some(value.to_owned()),
            Some(cipher) => match cipher.encrypt(value) {
                Ok(sealed) => Some(sealed),
                Err(e) => {
                    warn!(key, "refusing to store value: {e}");
                    None
                }
            },
        }
    }

    fn open(cipher: Option<&SecureCipher>, key: &str, stored: String) -> String {
        match cipher {
            None => stored,
            Some(cipher) => match cipher.decrypt(&stored) {
                Ok(plain) => plain,
                Err(e) => {
                    warn!(key, "value is not decryptable, returning it as stored: {e}");
                    stored
                }
            },
        }
    }

    fn report(key: &str, op: &str, result: vigil_core::error::Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(key, op, "preference write failed: {e}");
                false
            }
        }
    }

    fn read<T>(key: &str, result: vigil_core::error::Result<Option<T>>) -> Option<T> {
        result.unwrap_or_else(|e| {
            warn!(key, "preference read failed: {e}");
            None
        })
    }

    // -- strings -------------------------------------------------------------

    pub async fn get_string(&self, key: &str) -> Option<String> {
        let stored = Self::read(key, self.inner.get_string(key).await)?;
        let cipher = self.read_cipher().await;
        Some(Self::open(cipher.as_deref(), key, stored))
    }

    pub async fn set_string(&self, key: &str, value: &str) -> bool {
        let cipher = self.write_cipher().await;
        let Some(sealed) = Self::seal(cipher.as_deref(), key, value) else {
            return false;
        };
        Self::report(key, "set_string", self.inner.set_string(key, &sealed).await)
    }

    pub async fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        let stored = Self::read(key, self.inner.get_string_list(key).await)?;
        let cipher = self.read_cipher().await;
        Some(
            stored
                .into_iter()
                .map(|item| Self::open(cipher.as_deref(), key, item))
                .collect(),
        )
    }

    pub async fn set_string_list(&self, key: &str, values: &[String]) -> bool {
        let cipher = self.write_cipher().await;
        let sealed: Option<Vec<String>> = values
            .iter()
            .map(|item| Self::seal(cipher.as_deref(), key, item))
            .collect();
        let Some(sealed) = sealed else {
            return false;
        };
        Self::report(key, "set_string_list", self.inner.set_string_list(key, sealed).await)
    }

    // -- pass-through --------------------------------------------------------

    pub async fn get_bool(&self, key: &str) -> Option<bool> {
        Self::read(key, self.inner.get_bool(key).await)
    }

    pub async fn set_bool(&self, key: &str, value: bool) -> bool {
        Self::report(key, "set_bool", self.inner.set_bool(key, value).await)
    }

    pub async fn get_int(&self, key: &str) -> Option<i64> {
        Self::read(key, self.inner.get_int(key).await)
    }

    pub async fn set_int(&self, key: &str, value: i64) -> bool {
        Self::report(key, "set_int", self.inner.set_int(key, value).await)
    }

    pub async fn get_double(&self, key: &str) -> Option<f64> {
        Self::read(key, self.inner.get_double(key).await)
    }

    pub async fn set_double(&self, key: &str, value: f64) -> bool {
        Self::report(key, "set_double", self.inner.set_double(key, value).await)
    }

    pub async fn remove(&self, key: &str) -> bool {
        Self::report(key, "remove", self.inner.remove(key).await)
    }

    pub async fn clear(&self) -> bool {
        Self::report("*", "clear", self.inner.clear().await)
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key).await.unwrap_or_else(|e| {
            warn!(key, "preference lookup failed: {e}");
            false
        })
    }

    pub async fn keys(&self) -> Vec<String> {
        self.inner.keys().await.unwrap_or_else(|e| {
            warn!("listing preference keys failed: {e}");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vigil_bridge::stub::{MemorySecureStorage, StaticSecret};
    use vigil_core::types::KeyDerivation;

    use super::*;
    use crate::keys::KeyMaterialProvider;
    use crate::kv::MemoryKeyValueStore;
    use crate::storage::SqliteKeyValueStore;

    fn backend() -> Arc<MemoryKeyValueStore> {
        Arc::new(MemoryKeyValueStore::new())
    }

    async fn derived_cipher(strategy: CipherStrategy) -> Arc<SecureCipher> {
        let provider = KeyMaterialProvider::new(
            Arc::new(StaticSecret::new("abc123")),
            Arc::new(MemorySecureStorage::new()),
            KeyDerivation::Hkdf,
        );
        let material = provider.initialize().await.unwrap();
        Arc::new(SecureCipher::new(material, strategy))
    }

    #[tokio::test]
    async fn disabled_store_writes_plaintext() {
        let inner = backend();
        let store = EncryptedPreferenceStore::new(inner.clone());

        assert!(!store.is_encryption_enabled().await);
        assert!(store.set_string("k", "v").await);
        assert_eq!(store.get_string("k").await.as_deref(), Some("v"));
        assert_eq!(inner.get_string("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn enabled_store_hides_stored_value() {
        for strategy in [CipherStrategy::StreamMac, CipherStrategy::AeadBlock] {
            let inner = backend();
            let store =
                EncryptedPreferenceStore::with_cipher(inner.clone(), derived_cipher(strategy).await, true);

            assert!(store.is_encryption_enabled().await);
            assert!(store.set_string("k", "v").await);
            let stored = inner.get_string("k").await.unwrap().unwrap();
            assert_ne!(stored, "v");
            assert_eq!(store.get_string("k").await.as_deref(), Some("v"));
        }
    }

    #[tokio::test]
    async fn legacy_plaintext_survives_enabling() {
        let inner = backend();
        inner.set_string("token", "written-before").await.unwrap();

        let store =
            EncryptedPreferenceStore::with_cipher(inner.clone(), derived_cipher(CipherStrategy::StreamMac).await, true);
        assert_eq!(store.get_string("token").await.as_deref(), Some("written-before"));

        assert!(store.set_string("token", "written-after").await);
        assert_eq!(store.get_string("token").await.as_deref(), Some("written-after"));
    }

    #[tokio::test]
    async fn encrypted_values_readable_after_disabling() {
        let inner = backend();
        let store = EncryptedPreferenceStore::new(inner.clone());
        store.initialize_encryption("a-caller-managed-key", "an-iv", true).await;

        assert!(store.set_string("k", "secret").await);
        store.set_encryption_enabled(false).await;

        assert!(!store.is_encryption_enabled().await);
        assert_eq!(store.get_string("k").await.as_deref(), Some("secret"));

        assert!(store.set_string("k2", "open").await);
        assert_eq!(inner.get_string("k2").await.unwrap().as_deref(), Some("open"));
    }

    #[tokio::test]
    async fn enabling_without_key_stays_plaintext() {
        let inner = backend();
        let store = EncryptedPreferenceStore::new(inner.clone());
        store.set_encryption_enabled(true).await;

        assert!(!store.is_encryption_enabled().await);
        assert!(store.set_string("k", "v").await);
        assert_eq!(inner.get_string("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn config_drives_initial_flag() {
        let config = SecurityConfig {
            encrypt_preferences: true,
            ..SecurityConfig::default()
        };
        let cipher = derived_cipher(CipherStrategy::AeadBlock).await;

        let store = EncryptedPreferenceStore::from_config(backend(), Some(cipher), &config);
        assert!(store.is_encryption_enabled().await);

        let keyless = EncryptedPreferenceStore::from_config(backend(), None, &config);
        assert!(!keyless.is_encryption_enabled().await);
        keyless.set_encryption_key("late key").await;
        assert!(keyless.is_encryption_enabled().await);
    }

    #[tokio::test]
    async fn key_then_iv_configuration() {
        let inner = backend();
        let store = EncryptedPreferenceStore::new(inner.clone()).with_strategy(CipherStrategy::AeadBlock);
        store.set_encryption_key("k").await;
        store.set_encryption_iv("0123456789abcdef").await;
        store.set_encryption_enabled(true).await;

        assert!(store.set_string("session", "tok").await);
        assert_ne!(inner.get_string("session").await.unwrap().as_deref(), Some("tok"));
        assert_eq!(store.get_string("session").await.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn iv_rotation_applies_to_a_derived_cipher() {
        let inner = backend();
        let cipher = derived_cipher(CipherStrategy::AeadBlock).await;
        let old_iv = *cipher.iv();
        let store = EncryptedPreferenceStore::with_cipher(inner.clone(), Arc::clone(&cipher), true);

        store.set_encryption_iv("0123456789abcdef").await;
        assert!(store.set_string("k", "v").await);

        let sealed = inner.get_string("k").await.unwrap().unwrap();
        assert!(cipher.decrypt(&sealed).is_err(), "still sealed under the old IV");
        let rotated = cipher.with_iv(*b"0123456789abcdef");
        assert_eq!(rotated.decrypt(&sealed).unwrap(), "v");
        assert_ne!(old_iv, *b"0123456789abcdef");
        assert_eq!(store.get_string("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn key_change_keeps_the_derived_iv() {
        let inner = backend();
        let cipher = derived_cipher(CipherStrategy::AeadBlock).await;
        let store = EncryptedPreferenceStore::with_cipher(inner.clone(), Arc::clone(&cipher), true);

        store.set_encryption_key("replacement key").await;
        assert!(store.set_string("k", "v").await);

        let sealed = inner.get_string("k").await.unwrap().unwrap();
        let expected = SecureCipher::from_parts(
            normalize::<KEY_LEN>(b"replacement key"),
            *cipher.iv(),
            CipherStrategy::AeadBlock,
        );
        assert_eq!(expected.decrypt(&sealed).unwrap(), "v");
    }

    #[tokio::test]
    async fn rotated_key_cannot_read_old_values() {
        let inner = backend();
        let store = EncryptedPreferenceStore::new(inner.clone());
        store.initialize_encryption("first", "iv", true).await;
        assert!(store.set_string("k", "v").await);
        let sealed = inner.get_string("k").await.unwrap().unwrap();

        store.set_encryption_key("second").await;
        assert_eq!(store.get_string("k").await, Some(sealed));
    }

    #[tokio::test]
    async fn string_lists_are_encrypted_per_item() {
        let inner = backend();
        let store =
            EncryptedPreferenceStore::with_cipher(inner.clone(), derived_cipher(CipherStrategy::StreamMac).await, true);
        let values = vec!["alpha".to_string(), String::new(), "ω".to_string()];

        assert!(store.set_string_list("list", &values).await);
        let stored = inner.get_string_list("list").await.unwrap().unwrap();
        assert_eq!(stored.len(), 3);
        assert_ne!(stored[0], "alpha");
        assert_eq!(stored[1], "");
        assert_eq!(store.get_string_list("list").await, Some(values));
    }

    #[tokio::test]
    async fn primitives_bypass_encryption() {
        let inner = backend();
        let store =
            EncryptedPreferenceStore::with_cipher(inner.clone(), derived_cipher(CipherStrategy::StreamMac).await, true);

        assert!(store.set_bool("b", true).await);
        assert!(store.set_int("i", 42).await);
        assert!(store.set_double("d", 1.5).await);

        assert_eq!(inner.get_bool("b").await.unwrap(), Some(true));
        assert_eq!(inner.get_int("i").await.unwrap(), Some(42));
        assert_eq!(store.get_double("d").await, Some(1.5));
    }

    #[tokio::test]
    async fn backend_failure_is_false_not_panic() {
        let inner = backend();
        let store = EncryptedPreferenceStore::new(inner.clone());
        assert!(store.set_string("k", "v").await);
        inner.set_fail_writes(true);

        assert!(!store.set_string("k", "w").await);
        assert!(!store.set_bool("b", true).await);
        assert!(!store.remove("k").await);
        assert!(!store.clear().await);
        assert_eq!(store.get_string("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn remove_clear_and_keys() {
        let store = EncryptedPreferenceStore::new(backend());
        store.set_string("a", "1").await;
        store.set_int("b", 2).await;

        assert!(store.contains_key("a").await);
        assert_eq!(store.keys().await, vec!["a", "b"]);
        assert!(store.remove("a").await);
        assert!(!store.contains_key("a").await);
        assert!(store.clear().await);
        assert!(store.keys().await.is_empty());
        assert_eq!(store.get_string("a").await, None);
    }

    #[tokio::test]
    async fn sqlite_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.db");
        let cipher = derived_cipher(CipherStrategy::StreamMac).await;
        {
            let inner = Arc::new(SqliteKeyValueStore::open(&path).unwrap());
            let store = EncryptedPreferenceStore::with_cipher(inner, Arc::clone(&cipher), true);
            assert!(store.set_string("token", "token-xyz").await);
        }
        let inner = Arc::new(SqliteKeyValueStore::open(&path).unwrap());
        let stored = inner.get_string("token").await.unwrap().unwrap();
        assert_ne!(stored, "token-xyz");

        let store = EncryptedPreferenceStore::with_cipher(inner, cipher, true);
        assert_eq!(store.get_string("token").await.as_deref(), Some("token-xyz"));
    }
}
