// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Thin wrappers around the cryptographic primitives the server needs:
//! Ed25519 over caller-supplied key bytes, SHA-256, CSPRNG bytes and
//! constant-time comparison.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::ServiceError;

pub const SIGNATURE_LENGTH: usize = 64;
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Verifies an Ed25519 signature over `payload` under the given public key
/// bytes. Key bytes that do not decode to a valid curve point, as well as
/// signatures of the wrong length, fail with [`ServiceError::InvalidSignature`].
pub fn verify(key: &[u8], payload: &[u8], signature: &[u8]) -> Result<(), ServiceError> {
    let key: [u8; PUBLIC_KEY_LENGTH] = key
        .try_into()
        .map_err(|_| ServiceError::InvalidSignature)?;
    let key = VerifyingKey::from_bytes(&key).map_err(|_| ServiceError::InvalidSignature)?;
    let signature = Signature::from_slice(signature).map_err(|_| ServiceError::InvalidSignature)?;
    key.verify(payload, &signature)
        .map_err(|_| ServiceError::InvalidSignature)
}

/// Signs `payload` with the given signing key.
///
/// The server itself never signs user records; this is used by tests and
/// tooling that mint records client-side.
pub fn sign(key: &SigningKey, payload: &[u8]) -> [u8; SIGNATURE_LENGTH] {
    key.sign(payload).to_bytes()
}

/// SHA-256 over the concatenation of `parts`.
pub fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Cryptographically secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Constant-time equality. Slices of unequal length compare unequal without
/// branching on content.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_roundtrip() {
        let key = SigningKey::generate(&mut OsRng);
        let payload = b"payload";
        let signature = sign(&key, payload);
        verify(key.verifying_key().as_bytes(), payload, &signature).unwrap();
        assert!(verify(key.verifying_key().as_bytes(), b"other", &signature).is_err());
    }

    #[test]
    fn verify_rejects_bad_key_bytes() {
        let signature = [0u8; SIGNATURE_LENGTH];
        assert!(verify(&[0u8; 7], b"payload", &signature).is_err());
    }

    #[test]
    fn ct_eq_handles_lengths() {
        assert!(ct_eq(b"abcd", b"abcd"));
        assert!(!ct_eq(b"abcd", b"abce"));
        assert!(!ct_eq(b"abcd", b"abc"));
        assert!(!ct_eq(b"", b"a"));
        assert!(ct_eq(b"", b""));
    }

    #[test]
    fn sha256_concatenates_parts() {
        assert_eq!(sha256(&[b"ab", b"cd"]), sha256(&[b"abcd"]));
    }
}
