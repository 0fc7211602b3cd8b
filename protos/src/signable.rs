// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The signed-record convention.
//!
//! Signed records carry their signature inside the payload. The signed
//! bytes are the canonical encoding of the record with `signature = []`;
//! verification clears the field, re-encodes and checks the Ed25519
//! signature under the designated key. Key-pair records ([`TopicKey`],
//! [`CreationInfo`]) instead sign the raw concatenation
//! `signature_key ‖ encryption_key`.

use prost::Message;
use rdvcommon::{crypto, ServiceError};

use crate::{CreationInfo, DevicePrekey, InternalUser, Topic, TopicKey, TopicUpdate};

/// A record whose signature field sits inside the payload.
pub trait SignedPayload: Message + Clone {
    fn signature(&self) -> &[u8];
    fn clear_signature(&mut self);

    /// The canonical bytes covered by the signature.
    fn signed_bytes(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        unsigned.clear_signature();
        unsigned.encode_to_vec()
    }
}

macro_rules! signed_payload {
    ($name:ident) => {
        impl SignedPayload for $name {
            fn signature(&self) -> &[u8] {
                &self.signature
            }

            fn clear_signature(&mut self) {
                self.signature.clear();
            }
        }
    };
}

signed_payload!(InternalUser);
signed_payload!(DevicePrekey);
signed_payload!(Topic);
signed_payload!(TopicUpdate);

/// Verifies a signed record under the given key.
pub fn verify_signed<T: SignedPayload>(record: &T, key: &[u8]) -> Result<(), ServiceError> {
    crypto::verify(key, &record.signed_bytes(), record.signature())
}

/// Verifies a key-pair signature: `signature` by `identity_key` over
/// `signature_key ‖ encryption_key`.
pub fn verify_key_pair(
    identity_key: &[u8],
    signature_key: &[u8],
    encryption_key: &[u8],
    signature: &[u8],
) -> Result<(), ServiceError> {
    let payload = [signature_key, encryption_key].concat();
    crypto::verify(identity_key, &payload, signature)
}

impl TopicKey {
    /// Checks the key-pair signature under the owning user's identity key.
    pub fn verify(&self, identity_key: &[u8]) -> Result<(), ServiceError> {
        verify_key_pair(
            identity_key,
            &self.signature_key,
            &self.encryption_key,
            &self.signature,
        )
    }
}

impl CreationInfo {
    /// Checks the binding of a member's topic `signature_key` to the user
    /// identity named in this record.
    pub fn verify(&self, signature_key: &[u8]) -> Result<(), ServiceError> {
        verify_key_pair(
            &self.user_key,
            signature_key,
            &self.encryption_key,
            &self.signature,
        )
    }
}
