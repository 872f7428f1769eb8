// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SHA-256 fingerprints for identifying secrets in logs without revealing them.

use sha2::{Digest, Sha256};

/// Hex characters kept in a fingerprint.
const FINGERPRINT_LEN: usize = 16;

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Short, stable identifier for key material.
///
/// Two fingerprints match only when the underlying bytes match, which is
/// enough to spot a key change across process starts in a log.
pub fn fingerprint(secret: &[u8]) -> String {
    let mut digest = hash_bytes(secret);
    digest.truncate(FINGERPRINT_LEN);
    digest
}
