// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key material: combines the platform-attested native secret with a
// per-installation random secret into a fixed-length key and IV.
//
// The native secret is compiled into the host binary and can be extracted;
// the random secret lives only in protected storage on this device. Neither
// is sufficient alone. Derived material is never persisted: it is
// recomputed on every process start.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ring::hkdf;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument};
use vigil_bridge::{NativeSecretSource, SecureStorage};
use vigil_core::error::{Result, VigilError};
use vigil_core::SecurityConfig;
use vigil_core::types::KeyDerivation;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::integrity::fingerprint;

/// Symmetric key length (AES-256 / HMAC-SHA256 key).
pub const KEY_LEN: usize = 32;

/// IV length.
pub const IV_LEN: usize = 16;

/// Length of the generated random secret, before base64.
pub const RANDOM_SECRET_LEN: usize = 32;

/// Protected-storage key holding the base64 random secret.
pub const RANDOM_SECRET_KEY: &str = "vigil.random_secret";

/// Filler used to right-pad short key strings.
pub const KEY_FILLER: u8 = b'#';

const HKDF_INFO: &[u8] = b"vigil/key-material/v1";

/// Right-pad `bytes` with [`KEY_FILLER`] or truncate it to exactly `N` bytes.
///
/// A length fix-up for fixed-size ciphers, not a key-strengthening step.
pub fn normalize<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [KEY_FILLER; N];
    let take = bytes.len().min(N);
    out[..take].copy_from_slice(&bytes[..take]);
    out
}

/// Derived key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    native_secret: Vec<u8>,
    random_secret: Vec<u8>,
    combined_key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl KeyMaterial {
    /// Derive key and IV from the two secrets.
    pub fn derive(
        native_secret: &[u8],
        random_secret: &[u8],
        derivation: KeyDerivation,
    ) -> Result<Self> {
        let (combined_key, iv) = match derivation {
            KeyDerivation::Hkdf => derive_hkdf(native_secret, random_secret)?,
            KeyDerivation::Legacy => derive_legacy(native_secret, random_secret),
        };
        Ok(Self {
            native_secret: native_secret.to_vec(),
            random_secret: random_secret.to_vec(),
            combined_key,
            iv,
        })
    }

    pub fn native_secret(&self) -> &[u8] {
        &self.native_secret
    }

    pub fn random_secret(&self) -> &[u8] {
        &self.random_secret
    }

    pub fn combined_key(&self) -> &[u8; KEY_LEN] {
        &self.combined_key
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    /// Deterministic, non-reversible identifier for `label` under this
    /// installation's secrets. Lowercase hex HMAC-SHA256, 64 characters.
    pub fn obfuscate(&self, label: &str) -> String {
        let key = hmac::Key::new(hmac::HMAC_SHA256, &self.combined_key);
        hex::encode(hmac::sign(&key, label.as_bytes()).as_ref())
    }

    /// Log-safe identifier of the derived key.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.combined_key)
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Base64 of `native ‖ base64(random)`, first 32 characters, padded with
/// [`KEY_FILLER`]; IV is the first 16 characters of the key.
fn derive_legacy(native: &[u8], random: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut concatenated = native.to_vec();
    concatenated.extend_from_slice(STANDARD.encode(random).as_bytes());
    let mut encoded = STANDARD.encode(&concatenated);

    let key = normalize::<KEY_LEN>(encoded.as_bytes());
    let iv = normalize::<IV_LEN>(&key);

    concatenated.zeroize();
    encoded.zeroize();
    (key, iv)
}

/// Output length marker for `ring::hkdf`.
struct OkmLen(usize);

impl hkdf::KeyType for OkmLen {
    fn len(&self) -> usize {
        self.0
    }
}

/// HKDF-SHA256: salt = random secret, IKM = native secret.
fn derive_hkdf(native: &[u8], random: &[u8]) -> Result<([u8; KEY_LEN], [u8; IV_LEN])> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, random).extract(native);
    let info = [HKDF_INFO];
    let okm = prk
        .expand(&info, OkmLen(KEY_LEN + IV_LEN))
        .map_err(|_| VigilError::KeyDerivation("HKDF expand failed".into()))?;

    let mut out = [0u8; KEY_LEN + IV_LEN];
    okm.fill(&mut out)
        .map_err(|_| VigilError::KeyDerivation("HKDF fill failed".into()))?;

    let key = normalize::<KEY_LEN>(&out[..KEY_LEN]);
    let iv = normalize::<IV_LEN>(&out[KEY_LEN..]);
    out.zeroize();
    Ok((key, iv))
}

fn storage_err(e: VigilError) -> VigilError {
    match e {
        VigilError::SecureStorage(_) => e,
        other => VigilError::SecureStorage(other.to_string()),
    }
}

/// Produces [`KeyMaterial`] once per provider.
///
/// `initialize` is gated by a `OnceCell`: concurrent callers wait for a
/// single derivation and all observe the same material. A failed
/// derivation leaves the gate open so a later call can retry.
pub struct KeyMaterialProvider {
    native: Arc<dyn NativeSecretSource>,
    storage: Arc<dyn SecureStorage>,
    derivation: KeyDerivation,
    rng: SystemRandom,
    material: OnceCell<KeyMaterial>,
}

impl KeyMaterialProvider {
    pub fn new(
        native: Arc<dyn NativeSecretSource>,
        storage: Arc<dyn SecureStorage>,
        derivation: KeyDerivation,
    ) -> Self {
        Self {
            native,
            storage,
            derivation,
            rng: SystemRandom::new(),
            material: OnceCell::new(),
        }
    }

    /// Provider using the derivation mode chosen in `config`.
    pub fn from_config(
        native: Arc<dyn NativeSecretSource>,
        storage: Arc<dyn SecureStorage>,
        config: &SecurityConfig,
    ) -> Self {
        Self::new(native, storage, config.key_derivation)
    }

    pub fn derivation(&self) -> KeyDerivation {
        self.derivation
    }

    /// Already-derived material, if `initialize` has succeeded.
    pub fn get(&self) -> Option<&KeyMaterial> {
        self.material.get()
    }

    /// Derive key material, or return the material from an earlier call.
    ///
    /// Fails if the native secret or protected storage is unavailable; there
    /// is no fallback key.
    pub async fn initialize(&self) -> Result<&KeyMaterial> {
        self.material.get_or_try_init(|| self.derive()).await
    }

    /// Identifier for `label` under this installation's key material.
    pub async fn obfuscate(&self, label: &str) -> Result<String> {
        Ok(self.initialize().await?.obfuscate(label))
    }

    #[instrument(skip_all, fields(derivation = ?self.derivation))]
    async fn derive(&self) -> Result<KeyMaterial> {
        let native = self.native.native_secret().await.map_err(|e| {
            error!("native secret unavailable: {e}");
            match e {
                VigilError::NativeSecret(_) => e,
                other => VigilError::NativeSecret(other.to_string()),
            }
        })?;
        if native.is_empty() {
            error!("native secret is empty");
            return Err(VigilError::NativeSecret("empty secret".into()));
        }

        let random = self.random_secret().await.inspect_err(|e| {
            error!("random secret unavailable: {e}");
        })?;

        let material = KeyMaterial::derive(native.as_bytes(), &random, self.derivation)?;
        info!(fingerprint = %material.fingerprint(), "key material initialised");
        Ok(material)
    }

    /// Load the per-installation secret, generating and persisting it on
    /// first use.
    async fn random_secret(&self) -> Result<Vec<u8>> {
        if let Some(encoded) = self
            .storage
            .read(RANDOM_SECRET_KEY)
            .await
            .map_err(storage_err)?
        {
            let secret = STANDARD.decode(encoded.trim()).map_err(|e| {
                VigilError::SecureStorage(format!("stored random secret is corrupt: {e}"))
            })?;
            if secret.is_empty() {
                return Err(VigilError::SecureStorage(
                    "stored random secret is empty".into(),
                ));
            }
            debug!("random secret loaded");
            return Ok(secret);
        }

        let mut secret = vec![0u8; RANDOM_SECRET_LEN];
        self.rng
            .fill(&mut secret)
            .map_err(|_| VigilError::KeyDerivation("system random source failed".into()))?;
        self.storage
            .write(RANDOM_SECRET_KEY, &STANDARD.encode(&secret))
            .await
            .map_err(storage_err)?;
        info!("random secret generated and persisted");
        Ok(secret)
    }
}
