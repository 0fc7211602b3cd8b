// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The prekey surface: pool top-up and pool consumption.

use rdvcommon::{
    identifiers::{AuthToken, DeviceKey, UserKey},
    ServiceError,
};
use rdvprotos::{verify_signed, DevicePreKeyBundle, DevicePrekeyUploadRequest};

use crate::{push::PushNotificationProvider, Rendezvous};

impl<P: PushNotificationProvider> Rendezvous<P> {
    /// Appends uploaded prekeys to the device's pool. Every prekey must be
    /// signed by the uploading device.
    #[tracing::instrument(name = "Add device prekeys", skip_all)]
    pub async fn add_pre_keys(
        &self,
        request: DevicePrekeyUploadRequest,
    ) -> Result<(), ServiceError> {
        let user_key = UserKey::try_from(request.user_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("user key must be 32 bytes"))?;
        let device_key = DeviceKey::try_from(request.device_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("device key must be 32 bytes"))?;
        let token = AuthToken::try_from(request.auth_token.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("auth token must be 16 bytes"))?;

        let mut state = self.lock()?;
        state
            .registry
            .authenticate_user(&user_key, &device_key, &token)?;
        for prekey in &request.prekeys {
            verify_signed(prekey, device_key.as_slice()).map_err(|_| {
                ServiceError::InvalidKeyUpload("prekey is not signed by the uploading device")
            })?;
        }
        let remaining = state
            .storage
            .store_pre_keys(&user_key, &device_key, &request.prekeys)?;
        state
            .registry
            .set_remaining_pre_keys(device_key, remaining as u32);
        state.snapshot();
        Ok(())
    }

    /// Consumes up to `count` prekeys from each of the user's devices.
    /// Short pools bound the bundle: every device contributes the same
    /// number of keys.
    #[tracing::instrument(name = "Get device prekeys", skip_all)]
    pub async fn get_pre_keys(
        &self,
        user: &UserKey,
        device: &DeviceKey,
        token: &AuthToken,
        count: u32,
    ) -> Result<DevicePreKeyBundle, ServiceError> {
        let mut state = self.lock()?;
        let record = state.registry.authenticate_user(user, device, token)?;
        let devices: Vec<DeviceKey> = record
            .devices
            .iter()
            .filter_map(|d| DeviceKey::try_from(d.device_key.as_slice()).ok())
            .collect();

        let bundle = state
            .storage
            .consume_pre_keys(user, &devices, count as usize)?;
        for entry in &bundle.devices {
            if let Ok(key) = DeviceKey::try_from(entry.device_key.as_slice()) {
                state
                    .registry
                    .set_remaining_pre_keys(key, entry.remaining_keys);
            }
        }
        state.snapshot();
        Ok(bundle)
    }
}
