// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! User lifecycle: pin-gated registration, record retrieval and signed
//! deletion.

use rdvcommon::{
    identifiers::{AuthToken, DeviceKey, UserKey},
    time::Timestamp,
    ServiceError,
};
use rdvprotos::{verify_signed, InternalUser, RegistrationBundle};
use tracing::info;

use crate::{push::PushNotificationProvider, validator, Rendezvous};

impl<P: PushNotificationProvider> Rendezvous<P> {
    /// Registers a user together with their first device, the device's
    /// prekeys and an initial set of topic keys. Returns the device's auth
    /// token.
    #[tracing::instrument(name = "Register user", skip_all)]
    pub async fn register_user(
        &self,
        bundle: RegistrationBundle,
    ) -> Result<AuthToken, ServiceError> {
        let info = bundle
            .info
            .as_ref()
            .ok_or(ServiceError::InvalidRequest("missing user record"))?;
        let (device_key, app) = validator::validate_new_user(info)?;
        let user_key = UserKey::try_from(info.identity_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("identity key must be 32 bytes"))?;

        let now = Timestamp::now();
        let mut state = self.lock()?;

        // The registration gate comes first: a wrong pin burns a try even
        // if the rest of the bundle would not have passed.
        let admitted = state.registry.can_register(&info.name, bundle.pin, now);
        state.snapshot();
        if !admitted {
            return Err(ServiceError::AuthenticationFailed);
        }

        validator::ensure_fresh(info.timestamp, now)?;
        verify_signed(info, &info.identity_key)?;
        if state.registry.user(&user_key).is_some() {
            return Err(ServiceError::ResourceAlreadyExists);
        }
        if state.registry.device_key_in_use(&device_key) {
            return Err(ServiceError::ResourceAlreadyExists);
        }
        for prekey in &bundle.pre_keys {
            verify_signed(prekey, device_key.as_slice())?;
        }
        for topic_key in &bundle.topic_keys {
            topic_key.verify(&info.identity_key)?;
        }

        state.storage.create_user_tree(&user_key)?;
        state
            .storage
            .store_pre_keys(&user_key, &device_key, &bundle.pre_keys)?;
        state
            .storage
            .store_topic_keys(&user_key, &app, &bundle.topic_keys)?;

        state.registry.insert_user(info.clone())?;
        let token = AuthToken::random();
        state.registry.insert_auth_token(device_key, token);
        state.registry.create_mailbox(
            device_key,
            bundle.pre_keys.len() as u32,
            bundle.topic_keys.len() as u32,
        );
        state.registry.remove_allowed(&info.name);
        state.snapshot();
        info!(name = %info.name, "user registered");
        Ok(token)
    }

    /// Returns the current signed user record.
    #[tracing::instrument(name = "Get user info", skip_all)]
    pub async fn get_user_info(
        &self,
        user: &UserKey,
        device: &DeviceKey,
        token: &AuthToken,
    ) -> Result<InternalUser, ServiceError> {
        let state = self.lock()?;
        state.registry.authenticate_user(user, device, token)
    }

    /// Removes a user on presentation of a fresh self-signed record.
    #[tracing::instrument(name = "Delete user", skip_all)]
    pub async fn delete_user(&self, info: InternalUser) -> Result<(), ServiceError> {
        validator::verify_self_signed(&info)?;
        validator::ensure_fresh(info.timestamp, Timestamp::now())?;
        let user_key = UserKey::try_from(info.identity_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("identity key must be 32 bytes"))?;

        let mut state = self.lock()?;
        let record = state
            .registry
            .remove_user(&user_key)
            .ok_or(ServiceError::ResourceNotAvailable)?;
        for device in &record.devices {
            if let Ok(key) = DeviceKey::try_from(device.device_key.as_slice()) {
                state.registry.remove_device_state(&key);
            }
        }
        state.storage.delete_user_tree(&user_key)?;
        state.snapshot();
        info!(name = %record.name, "user deleted");
        Ok(())
    }
}
