// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use thiserror::Error;

/// The error kind shared by validators, registry and request handlers.
///
/// The HTTP adapter maps each kind to a status code; handlers propagate
/// kinds unchanged. Internal I/O, encoding and crypto failures are logged
/// where they occur and folded into [`ServiceError::Internal`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed body, missing or oversized parameter, or a broken
    /// structural invariant.
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    /// Unknown user, device or admin, bad token, or wrong pin.
    #[error("authentication failed")]
    AuthenticationFailed,
    /// No such topic key, topic, file or user.
    #[error("resource not available")]
    ResourceNotAvailable,
    /// A signature did not verify under the designated key.
    #[error("invalid signature")]
    InvalidSignature,
    /// User, device or topic collision.
    #[error("resource already exists")]
    ResourceAlreadyExists,
    /// Freshness window exceeded, or a timestamp that is not strictly newer
    /// than the previous one.
    #[error("request outdated")]
    RequestOutdated,
    /// Prekey owner mismatch, missing receiver device, or missing
    /// per-receiver key message.
    #[error("invalid key upload: {0}")]
    InvalidKeyUpload(&'static str),
    /// Encoding, I/O or crypto failure internal to the server.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        tracing::error!("io error: {e}");
        Self::Internal(e.to_string())
    }
}

impl From<prost::DecodeError> for ServiceError {
    fn from(e: prost::DecodeError) -> Self {
        tracing::error!("decode error: {e}");
        Self::Internal(e.to_string())
    }
}
