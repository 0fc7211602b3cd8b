// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Device lifecycle. Adding and removing devices is driven by an updated
//! self-signed user record; the server diffs it against the stored one.

use rdvcommon::{
    identifiers::{AuthToken, DeviceKey, UserKey},
    time::Timestamp,
    ServiceError,
};
use rdvprotos::InternalUser;
use tracing::info;

use crate::{push::PushNotificationProvider, validator, Rendezvous};

/// Push tokens are opaque 16-byte handles minted by the notification
/// server.
const PUSH_TOKEN_LENGTH: usize = 16;

impl<P: PushNotificationProvider> Rendezvous<P> {
    /// Accepts a user record with exactly one device appended and mints an
    /// auth token for the new device.
    #[tracing::instrument(name = "Register device", skip_all)]
    pub async fn register_device(&self, new_info: InternalUser) -> Result<AuthToken, ServiceError> {
        validator::verify_self_signed(&new_info)?;
        validator::ensure_fresh(new_info.timestamp, Timestamp::now())?;
        let user_key = UserKey::try_from(new_info.identity_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("identity key must be 32 bytes"))?;

        let mut state = self.lock()?;
        let old = state
            .registry
            .user(&user_key)
            .ok_or(ServiceError::ResourceNotAvailable)?;
        let added = validator::validate_device_added(old, &new_info)?;
        let added_key = DeviceKey::try_from(added.device_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("device key must be 32 bytes"))?;
        if state.registry.device_key_in_use(&added_key) {
            return Err(ServiceError::ResourceAlreadyExists);
        }

        let name = new_info.name.clone();
        state.registry.insert_user(new_info)?;
        let token = AuthToken::random();
        state.registry.insert_auth_token(added_key, token);
        state.registry.create_mailbox(added_key, 0, 0);
        state.snapshot();
        info!(name = %name, device = %added_key, "device registered");
        Ok(token)
    }

    /// Accepts a user record with exactly one device removed and drops the
    /// device's token, mailbox and prekeys.
    #[tracing::instrument(name = "Delete device", skip_all)]
    pub async fn delete_device(&self, new_info: InternalUser) -> Result<(), ServiceError> {
        validator::verify_self_signed(&new_info)?;
        validator::ensure_fresh(new_info.timestamp, Timestamp::now())?;
        let user_key = UserKey::try_from(new_info.identity_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("identity key must be 32 bytes"))?;

        let mut state = self.lock()?;
        let old = state
            .registry
            .user(&user_key)
            .ok_or(ServiceError::ResourceNotAvailable)?;
        let removed = validator::validate_device_removed(old, &new_info)?;
        let removed_key = DeviceKey::try_from(removed.device_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("device key must be 32 bytes"))?;

        let name = new_info.name.clone();
        state.registry.insert_user(new_info)?;
        state.registry.remove_device_state(&removed_key);
        state.storage.delete_device_pre_keys(&user_key, &removed_key)?;
        state.snapshot();
        info!(name = %name, device = %removed_key, "device deleted");
        Ok(())
    }

    /// Stores the push token the notification server issued for a device.
    #[tracing::instrument(name = "Set push token", skip_all)]
    pub async fn set_push_token(
        &self,
        user: &UserKey,
        device: &DeviceKey,
        token: &AuthToken,
        push_token: &[u8],
    ) -> Result<(), ServiceError> {
        if push_token.len() != PUSH_TOKEN_LENGTH {
            return Err(ServiceError::InvalidRequest(
                "push token must be 16 bytes",
            ));
        }
        let mut state = self.lock()?;
        state.registry.authenticate_user(user, device, token)?;
        state
            .registry
            .set_notification_token(*device, push_token.to_vec());
        state.snapshot();
        Ok(())
    }
}
