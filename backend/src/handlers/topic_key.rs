// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The topic-key surface. Uploaded topic keys are queued per (user,
//! application); every other device of the uploader receives one encrypted
//! copy of every key, so any device can later create topics with them.

use std::collections::HashSet;

use rdvcommon::{
    identifiers::{AppId, AuthToken, DeviceKey, UserKey},
    ServiceError,
};
use rdvprotos::{
    topic_key_response::UserTopicKey, TopicKey, TopicKeyBundle, TopicKeyRequest, TopicKeyResponse,
};

use crate::{push::PushNotificationProvider, Rendezvous};

impl<P: PushNotificationProvider> Rendezvous<P> {
    /// Accepts fresh topic keys plus their per-device encrypted copies.
    #[tracing::instrument(name = "Add topic keys", skip_all)]
    pub async fn add_topic_keys(&self, bundle: TopicKeyBundle) -> Result<(), ServiceError> {
        let user_key = UserKey::try_from(bundle.user_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("user key must be 32 bytes"))?;
        let device_key = DeviceKey::try_from(bundle.device_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("device key must be 32 bytes"))?;
        let token = AuthToken::try_from(bundle.auth_token.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("auth token must be 16 bytes"))?;
        let app = AppId::new(&bundle.application)
            .map_err(|_| ServiceError::InvalidRequest("invalid application id"))?;

        let (total, targets) = {
            let mut state = self.lock()?;
            let record = state
                .registry
                .authenticate_user(&user_key, &device_key, &token)?;
            for key in &bundle.keys {
                key.verify(&record.identity_key)?;
            }

            // Every device of the user in this application, except the
            // uploader, must be addressed...
            let expected: HashSet<&[u8]> = record
                .devices
                .iter()
                .filter(|d| d.application == bundle.application)
                .map(|d| d.device_key.as_slice())
                .filter(|key| *key != device_key.as_slice())
                .collect();
            let addressed: HashSet<&[u8]> = bundle
                .messages
                .iter()
                .map(|list| list.device_key.as_slice())
                .collect();
            if expected != addressed {
                return Err(ServiceError::InvalidKeyUpload(
                    "key messages must address exactly the user's other devices",
                ));
            }
            // ...and must receive one encrypted copy of every uploaded key.
            let uploaded: HashSet<&[u8]> = bundle
                .keys
                .iter()
                .map(|key| key.signature_key.as_slice())
                .collect();
            for list in &bundle.messages {
                let covered: HashSet<&[u8]> = list
                    .messages
                    .iter()
                    .map(|message| message.signature_key.as_slice())
                    .collect();
                if covered != uploaded {
                    return Err(ServiceError::InvalidKeyUpload(
                        "every receiver must get a copy of every key",
                    ));
                }
            }

            let total = state
                .storage
                .store_topic_keys(&user_key, &app, &bundle.keys)?;
            let targets = state
                .registry
                .enqueue_topic_key_messages(&user_key, &bundle.messages);
            state
                .registry
                .set_remaining_topic_keys(&user_key, total as u32);
            state.snapshot();
            (total, targets)
        };
        tracing::debug!(total, "topic keys stored");
        self.notify_all(targets).await;
        Ok(())
    }

    /// Consumes one topic key from the receiver's queue.
    #[tracing::instrument(name = "Get topic key", skip_all)]
    pub async fn get_topic_key(
        &self,
        user: &UserKey,
        device: &DeviceKey,
        token: &AuthToken,
        receiver: &UserKey,
        application: &str,
    ) -> Result<TopicKey, ServiceError> {
        let app = AppId::new(application)
            .map_err(|_| ServiceError::InvalidRequest("invalid application id"))?;
        let mut state = self.lock()?;
        state.registry.authenticate_user(user, device, token)?;
        if state.registry.user(receiver).is_none() {
            return Err(ServiceError::ResourceNotAvailable);
        }
        let key = state.storage.consume_topic_key(receiver, &app)?;
        let remaining = state.storage.count_topic_keys(receiver, &app)?;
        state
            .registry
            .set_remaining_topic_keys(receiver, remaining as u32);
        state.snapshot();
        Ok(key)
    }

    /// Bulk form: one topic key for each listed user. Users with an empty
    /// queue (or unknown to the server) are skipped.
    #[tracing::instrument(name = "Get topic keys", skip_all)]
    pub async fn get_topic_keys(
        &self,
        request: TopicKeyRequest,
    ) -> Result<TopicKeyResponse, ServiceError> {
        let user_key = UserKey::try_from(request.user_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("user key must be 32 bytes"))?;
        let device_key = DeviceKey::try_from(request.device_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("device key must be 32 bytes"))?;
        let token = AuthToken::try_from(request.auth_token.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("auth token must be 16 bytes"))?;
        let app = AppId::new(&request.application)
            .map_err(|_| ServiceError::InvalidRequest("invalid application id"))?;

        let mut state = self.lock()?;
        state
            .registry
            .authenticate_user(&user_key, &device_key, &token)?;

        let mut response = TopicKeyResponse::default();
        for receiver in &request.users {
            let Ok(receiver) = UserKey::try_from(receiver.as_slice()) else {
                continue;
            };
            if state.registry.user(&receiver).is_none() {
                continue;
            }
            let key = match state.storage.consume_topic_key(&receiver, &app) {
                Ok(key) => key,
                Err(ServiceError::ResourceNotAvailable) => continue,
                Err(e) => return Err(e),
            };
            let remaining = state.storage.count_topic_keys(&receiver, &app)?;
            state
                .registry
                .set_remaining_topic_keys(&receiver, remaining as u32);
            response.users.push(UserTopicKey {
                user_key: receiver.to_vec(),
                key: Some(key),
            });
        }
        state.snapshot();
        Ok(response)
    }
}
