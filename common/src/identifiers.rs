// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Newtypes for the identifiers used across the server. All binary ids are
//! opaque byte strings of a fixed length; they render as unpadded base32 in
//! storage paths and URL path segments.

use std::fmt::{self, Display, Formatter};

use data_encoding::BASE32_NOPAD;
use thiserror::Error;

use crate::crypto::ct_eq;

pub const USER_KEY_LENGTH: usize = 32;
pub const DEVICE_KEY_LENGTH: usize = 32;
pub const TOPIC_ID_LENGTH: usize = 12;
pub const MESSAGE_ID_LENGTH: usize = 12;
pub const AUTH_TOKEN_LENGTH: usize = 16;

pub const MAX_NAME_LENGTH: usize = 32;
pub const MAX_APP_ID_LENGTH: usize = 10;

#[derive(Debug, Clone, Error)]
pub enum IdentifierError {
    #[error("identifier has the wrong length")]
    WrongLength,
    #[error("identifier is not valid base32")]
    NotBase32,
    #[error("application id is too long or empty")]
    InvalidAppId,
}

macro_rules! binary_id {
    ($(#[$doc:meta])* $name:ident, $length:expr) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $length]);

        impl $name {
            pub const LENGTH: usize = $length;

            pub fn new(bytes: [u8; $length]) -> Self {
                Self(bytes)
            }

            pub fn as_slice(&self) -> &[u8] {
                &self.0
            }

            pub fn to_vec(&self) -> Vec<u8> {
                self.0.to_vec()
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = IdentifierError;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                let bytes: [u8; $length] =
                    bytes.try_into().map_err(|_| IdentifierError::WrongLength)?;
                Ok(Self(bytes))
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdentifierError;

            /// Parses the unpadded base32 rendering used in paths.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = BASE32_NOPAD
                    .decode(s.as_bytes())
                    .map_err(|_| IdentifierError::NotBase32)?;
                Self::try_from(bytes.as_slice())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", BASE32_NOPAD.encode(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

binary_id!(
    /// The Ed25519 public key binding a user across the server.
    UserKey,
    USER_KEY_LENGTH
);

binary_id!(
    /// The Ed25519 public key binding one device of one user.
    DeviceKey,
    DEVICE_KEY_LENGTH
);

binary_id!(
    /// Identifies a topic; also the initial output of its hash chain.
    TopicId,
    TOPIC_ID_LENGTH
);

binary_id!(
    /// Identifies an encrypted file within a topic.
    MessageId,
    MESSAGE_ID_LENGTH
);

/// A bearer token minted per device (and for the admin surface). Comparison
/// is constant-time.
#[derive(Clone, Copy)]
pub struct AuthToken([u8; AUTH_TOKEN_LENGTH]);

impl AuthToken {
    pub fn random() -> Self {
        Self(crate::crypto::random_bytes())
    }

    pub fn new(bytes: [u8; AUTH_TOKEN_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl TryFrom<&[u8]> for AuthToken {
    type Error = IdentifierError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; AUTH_TOKEN_LENGTH] =
            bytes.try_into().map_err(|_| IdentifierError::WrongLength)?;
        Ok(Self(bytes))
    }
}

impl PartialEq for AuthToken {
    fn eq(&self, other: &Self) -> bool {
        ct_eq(&self.0, &other.0)
    }
}

impl Eq for AuthToken {}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken(..)")
    }
}

/// An application identifier, at most [`MAX_APP_ID_LENGTH`] characters.
/// Renders as unpadded URL-safe base64 in storage paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppId(String);

impl AppId {
    pub fn new(id: &str) -> Result<Self, IdentifierError> {
        if id.is_empty() || id.chars().count() > MAX_APP_ID_LENGTH {
            return Err(IdentifierError::InvalidAppId);
        }
        Ok(Self(id.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path-safe rendering used in the storage tree.
    pub fn path_segment(&self) -> String {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        URL_SAFE_NO_PAD.encode(self.0.as_bytes())
    }
}

impl Display for AppId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn base32_roundtrip() {
        let id = TopicId::new([7u8; TOPIC_ID_LENGTH]);
        let encoded = id.to_string();
        assert_eq!(TopicId::from_str(&encoded).unwrap(), id);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(UserKey::try_from([0u8; 31].as_slice()).is_err());
        assert!(TopicId::try_from([0u8; 13].as_slice()).is_err());
    }

    #[test]
    fn auth_token_compares_by_content() {
        let a = AuthToken::new([1u8; AUTH_TOKEN_LENGTH]);
        let b = AuthToken::new([1u8; AUTH_TOKEN_LENGTH]);
        let c = AuthToken::new([2u8; AUTH_TOKEN_LENGTH]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn app_id_limits() {
        assert!(AppId::new("chat").is_ok());
        assert!(AppId::new("").is_err());
        assert!(AppId::new("elevenchars").is_err());
    }
}
