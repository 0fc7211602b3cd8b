// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The admin surface: token rotation, the registration allow-list and
//! forced user removal. All operations are gated on the admin token; the
//! snapshot is the durable record for this state, so a failed snapshot
//! fails the request.

use rand::Rng;
use rdvcommon::{
    identifiers::{AuthToken, DeviceKey, UserKey},
    time::{Timestamp, PIN_EXPIRY_SECONDS},
    ServiceError,
};
use rdvprotos::AllowedUser;
use tracing::info;

use crate::{push::PushNotificationProvider, validator, Rendezvous};

/// Upper bound (exclusive) for registration pins.
const PIN_RANGE: u32 = 100_000;

impl<P: PushNotificationProvider> Rendezvous<P> {
    /// Replaces the admin token with a fresh one and returns it.
    #[tracing::instrument(name = "Renew admin token", skip_all)]
    pub async fn renew_admin_token(&self, token: &AuthToken) -> Result<AuthToken, ServiceError> {
        let mut state = self.lock()?;
        state.registry.verify_admin(token)?;
        let new_token = AuthToken::random();
        state.registry.set_admin_token(new_token);
        state.snapshot_strict()?;
        info!("admin token renewed");
        Ok(new_token)
    }

    /// Wipes all storage and state. Only available in development mode.
    #[tracing::instrument(name = "Reset server", skip_all)]
    pub async fn reset_all(&self, token: &AuthToken) -> Result<(), ServiceError> {
        if !self.development {
            return Err(ServiceError::InvalidRequest(
                "reset is only available in development mode",
            ));
        }
        let mut state = self.lock()?;
        state.registry.verify_admin(token)?;
        state.storage.delete_all()?;
        state.registry.reset();
        state.snapshot_strict()?;
        info!("server reset");
        Ok(())
    }

    /// Clears `name` for registration with a fresh pin.
    #[tracing::instrument(name = "Allow user", skip_all)]
    pub async fn allow_user(
        &self,
        token: &AuthToken,
        name: &str,
    ) -> Result<AllowedUser, ServiceError> {
        validator::validate_name(name)?;
        let mut state = self.lock()?;
        state.registry.verify_admin(token)?;
        if state.registry.has_user_named(name) {
            return Err(ServiceError::ResourceAlreadyExists);
        }
        let entry = AllowedUser {
            name: name.to_owned(),
            pin: rand::thread_rng().gen_range(0..PIN_RANGE),
            expiry: Timestamp::now().adding(PIN_EXPIRY_SECONDS).seconds(),
            tries_remaining: 3,
        };
        state.registry.allow(entry.clone());
        state.snapshot_strict()?;
        info!(name, "user allowed to register");
        Ok(entry)
    }

    /// Removes a user and every trace of their devices without a signed
    /// request.
    #[tracing::instrument(name = "Delete user as admin", skip_all)]
    pub async fn delete_user_as_admin(
        &self,
        token: &AuthToken,
        user: &UserKey,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        state.registry.verify_admin(token)?;
        let record = state
            .registry
            .remove_user(user)
            .ok_or(ServiceError::ResourceNotAvailable)?;
        for device in &record.devices {
            if let Ok(key) = DeviceKey::try_from(device.device_key.as_slice()) {
                state.registry.remove_device_state(&key);
            }
        }
        state.storage.delete_user_tree(user)?;
        state.snapshot_strict()?;
        info!(name = %record.name, "user deleted by admin");
        Ok(())
    }

    /// A plain-text listing of registered and allowed users for the admin
    /// console.
    #[tracing::instrument(name = "List accounts", skip_all)]
    pub async fn list_accounts(&self, token: &AuthToken) -> Result<String, ServiceError> {
        let state = self.lock()?;
        state.registry.verify_admin(token)?;
        Ok(state.registry.accounts_listing())
    }
}
