// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The push-notification seam. The core computes which devices to wake
//! while it holds the state lock; the provider is invoked afterwards, and a
//! failed push is logged without affecting the committed request.

use async_trait::async_trait;
use thiserror::Error;

/// One notification to deliver: the owning user's notification server and
/// the device's push token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub server: String,
    pub token: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum PushNotificationError {
    /// The notification server could not be reached.
    #[error("network error: {0}")]
    NetworkError(String),
    /// The notification server rejected the request.
    #[error("unexpected status: {0}")]
    UnexpectedStatus(String),
    /// The provider is not usable as configured.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[async_trait]
pub trait PushNotificationProvider: Send + Sync + 'static {
    async fn notify(&self, target: &PushTarget) -> Result<(), PushNotificationError>;
}

/// Provider that drops all notifications. Used in tests and when no
/// notification server is configured.
#[derive(Debug, Clone, Default)]
pub struct NullPushProvider;

#[async_trait]
impl PushNotificationProvider for NullPushProvider {
    async fn notify(&self, _target: &PushTarget) -> Result<(), PushNotificationError> {
        Ok(())
    }
}
