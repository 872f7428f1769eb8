// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Secure cipher: string-in, string-out authenticated encryption over the
// derived key material.
//
// Two envelope formats:
//
//   StreamMac   base64(iv ‖ ciphertext) ":" hex(hmac_sha256(key, plaintext))
//               Fresh 16-byte IV per message. Keystream blocks are
//               HMAC-SHA256(stream_key, iv ‖ counter_be64), where
//               stream_key is HMAC-SHA256(key, "vigil/keystream").
//
//   AeadBlock   base64(nonce ‖ ciphertext ‖ gcm_tag)
//               AES-256-GCM, fresh 96-bit nonce per message, the derived
//               IV as associated data.
//
// Both fail closed: a modified envelope yields `IntegrityMismatch` or
// `MalformedEnvelope`, never altered plaintext. Falling back to the raw
// input is a decision for the caller (see `preferences`).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, instrument};
use vigil_core::error::{Result, VigilError};
use vigil_core::types::CipherStrategy;
use zeroize::Zeroizing;

use crate::integrity::fingerprint;
use crate::keys::{IV_LEN, KEY_LEN, KeyMaterial};

/// HMAC-SHA256 output length.
const MAC_LEN: usize = 32;

const KEYSTREAM_LABEL: &[u8] = b"vigil/keystream";

/// Separator between the body and the hex integrity tag.
const TAG_SEPARATOR: char = ':';

/// Parsed StreamMac envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub iv: [u8; IV_LEN],
    pub payload: Vec<u8>,
    pub integrity_tag: Vec<u8>,
}

impl Envelope {
    /// Parse the transport string form.
    pub fn parse(text: &str) -> Result<Self> {
        let (body, tag_hex) = text
            .split_once(TAG_SEPARATOR)
            .ok_or_else(|| VigilError::MalformedEnvelope("missing integrity tag".into()))?;

        let raw = STANDARD
            .decode(body)
            .map_err(|e| VigilError::MalformedEnvelope(format!("body is not base64: {e}")))?;
        if raw.len() <= IV_LEN {
            return Err(VigilError::MalformedEnvelope("body shorter than IV".into()));
        }

        let integrity_tag = hex::decode(tag_hex)
            .map_err(|e| VigilError::MalformedEnvelope(format!("tag is not hex: {e}")))?;
        // Only the lower-case form `encrypt` writes is accepted.
        if hex::encode(&integrity_tag) != tag_hex {
            return Err(VigilError::MalformedEnvelope("tag is not lower-case hex".into()));
        }
        if integrity_tag.len() != MAC_LEN {
            return Err(VigilError::MalformedEnvelope(format!(
                "tag is {} bytes, expected {MAC_LEN}",
                integrity_tag.len()
            )));
        }

        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&raw[..IV_LEN]);
        Ok(Self {
            iv,
            payload: raw[IV_LEN..].to_vec(),
            integrity_tag,
        })
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut body = Vec::with_capacity(IV_LEN + self.payload.len());
        body.extend_from_slice(&self.iv);
        body.extend_from_slice(&self.payload);
        write!(
            f,
            "{}{TAG_SEPARATOR}{}",
            STANDARD.encode(body),
            hex::encode(&self.integrity_tag)
        )
    }
}

/// Authenticated string encryption with a fixed key.
pub struct SecureCipher {
    key: Zeroizing<[u8; KEY_LEN]>,
    iv: [u8; IV_LEN],
    strategy: CipherStrategy,
    mac_key: hmac::Key,
    stream_key: hmac::Key,
    rng: SystemRandom,
}

impl SecureCipher {
    /// Cipher over derived key material.
    pub fn new(material: &KeyMaterial, strategy: CipherStrategy) -> Self {
        Self::from_parts(*material.combined_key(), *material.iv(), strategy)
    }

    /// Cipher over caller-managed key and IV.
    pub fn from_parts(key: [u8; KEY_LEN], iv: [u8; IV_LEN], strategy: CipherStrategy) -> Self {
        let mac_key = hmac::Key::new(hmac::HMAC_SHA256, &key);
        let stream_seed = hmac::sign(&mac_key, KEYSTREAM_LABEL);
        let stream_key = hmac::Key::new(hmac::HMAC_SHA256, stream_seed.as_ref());
        Self {
            key: Zeroizing::new(key),
            iv,
            strategy,
            mac_key,
            stream_key,
            rng: SystemRandom::new(),
        }
    }

    /// Same key and strategy, different IV.
    pub fn with_iv(&self, iv: [u8; IV_LEN]) -> Self {
        Self::from_parts(*self.key, iv, self.strategy)
    }

    pub fn strategy(&self) -> CipherStrategy {
        self.strategy
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    /// Encrypt `plaintext`. The empty string encrypts to itself.
    #[instrument(skip_all, fields(strategy = ?self.strategy, len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let sealed = match self.strategy {
            CipherStrategy::StreamMac => self.seal_stream(plaintext.as_bytes())?,
            CipherStrategy::AeadBlock => self.seal_aead(plaintext.as_bytes())?,
        };
        debug!(sealed_len = sealed.len(), "encryption complete");
        Ok(sealed)
    }

    /// Decrypt a string produced by [`encrypt`](Self::encrypt).
    ///
    /// Tampered, truncated or foreign input is an error; the input is never
    /// echoed back.
    #[instrument(skip_all, fields(strategy = ?self.strategy, len = sealed.len()))]
    pub fn decrypt(&self, sealed: &str) -> Result<String> {
        if sealed.is_empty() {
            return Ok(String::new());
        }
        let plaintext = match self.strategy {
            CipherStrategy::StreamMac => self.open_stream(sealed)?,
            CipherStrategy::AeadBlock => self.open_aead(sealed)?,
        };
        String::from_utf8(plaintext)
            .map_err(|e| VigilError::Decryption(format!("plaintext is not UTF-8: {e}")))
    }

    fn random<const N: usize>(&self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.rng
            .fill(&mut buf)
            .map_err(|_| VigilError::Encryption("system random source failed".into()))?;
        Ok(buf)
    }

    // -- StreamMac -----------------------------------------------------------

    fn apply_keystream(&self, iv: &[u8; IV_LEN], data: &mut [u8]) {
        for (counter, chunk) in data.chunks_mut(MAC_LEN).enumerate() {
            let mut ctx = hmac::Context::with_key(&self.stream_key);
            ctx.update(iv);
            ctx.update(&(counter as u64).to_be_bytes());
            let block = ctx.sign();
            for (byte, k) in chunk.iter_mut().zip(block.as_ref()) {
                *byte ^= k;
            }
        }
    }

    fn seal_stream(&self, plaintext: &[u8]) -> Result<String> {
        let iv = self.random::<IV_LEN>()?;
        let mut payload = plaintext.to_vec();
        self.apply_keystream(&iv, &mut payload);
        let tag = hmac::sign(&self.mac_key, plaintext);

        Ok(Envelope {
            iv,
            payload,
            integrity_tag: tag.as_ref().to_vec(),
        }
        .to_string())
    }

    fn open_stream(&self, sealed: &str) -> Result<Vec<u8>> {
        let envelope = Envelope::parse(sealed)?;
        let mut plaintext = Zeroizing::new(envelope.payload);
        self.apply_keystream(&envelope.iv, &mut plaintext);

        hmac::verify(&self.mac_key, &plaintext, &envelope.integrity_tag)
            .map_err(|_| VigilError::IntegrityMismatch)?;
        Ok(plaintext.to_vec())
    }

    // -- AeadBlock -----------------------------------------------------------

    fn aead_key(&self) -> Result<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, self.key.as_slice())
            .map_err(|_| VigilError::Encryption("invalid AES-256 key".into()))?;
        Ok(LessSafeKey::new(unbound))
    }

    fn seal_aead(&self, plaintext: &[u8]) -> Result<String> {
        let key = self.aead_key()?;
        let nonce_bytes = self.random::<NONCE_LEN>()?;

        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::from(self.iv),
            &mut in_out,
        )
        .map_err(|_| VigilError::Encryption("AES-GCM seal failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&in_out);
        Ok(STANDARD.encode(out))
    }

    fn open_aead(&self, sealed: &str) -> Result<Vec<u8>> {
        let raw = STANDARD
            .decode(sealed)
            .map_err(|e| VigilError::MalformedEnvelope(format!("not base64: {e}")))?;
        if raw.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(VigilError::MalformedEnvelope("envelope too short".into()));
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| VigilError::MalformedEnvelope("bad nonce".into()))?;

        let key = self.aead_key()?;
        let mut in_out = ciphertext.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::from(self.iv), &mut in_out)
            .map_err(|_| VigilError::IntegrityMismatch)?;
        Ok(plaintext.to_vec())
    }
}

impl std::fmt::Debug for SecureCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureCipher")
            .field("strategy", &self.strategy)
            .field("key", &fingerprint(self.key.as_slice()))
            .finish_non_exhaustive()
    }
}
