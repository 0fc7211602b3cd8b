// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The topic surface: creation, appending updates to the hash chain,
//! range reads and file retrieval.

use rdvcommon::{
    identifiers::{AuthToken, DeviceKey, MessageId, TopicId, UserKey},
    time::Timestamp,
    ServiceError,
};
use rdvprotos::{ChainState, MessageChain, Topic, TopicUpdateUpload};
use tracing::info;

use crate::{push::PushNotificationProvider, validator, Rendezvous};

impl<P: PushNotificationProvider> Rendezvous<P> {
    /// Creates a topic and fans the creation record out to every member
    /// device except the creator's.
    #[tracing::instrument(name = "Create topic", skip_all)]
    pub async fn create_topic(
        &self,
        user: &UserKey,
        device: &DeviceKey,
        token: &AuthToken,
        topic: Topic,
    ) -> Result<(), ServiceError> {
        let targets = {
            let mut state = self.lock()?;
            state.registry.authenticate_user(user, device, token)?;
            let topic_id = validator::validate_topic_creation(&topic, user, Timestamp::now())?;
            for member in &topic.members {
                let member_user = member
                    .info
                    .as_ref()
                    .and_then(|info| UserKey::try_from(info.user_key.as_slice()).ok())
                    .ok_or(ServiceError::InvalidRequest(
                        "every member must carry creation info",
                    ))?;
                if state.registry.user(&member_user).is_none() {
                    return Err(ServiceError::ResourceNotAvailable);
                }
            }
            if state.registry.topic(&topic_id).is_some() || state.storage.has_topic(&topic_id) {
                return Err(ServiceError::ResourceAlreadyExists);
            }

            state.storage.create_topic_tree(&topic_id)?;
            state.registry.insert_topic(topic_id, topic.clone());
            let targets = state.registry.enqueue_topic_update(&topic, Some(device));
            state.snapshot();
            info!(topic = %topic_id, members = topic.members.len(), "topic created");
            targets
        };
        self.notify_all(targets).await;
        Ok(())
    }

    /// Validates and commits one update: stores its files, appends it to
    /// the chain, advances the chain head and fans the committed message
    /// out to every member device except the sender. Returns the new chain
    /// head.
    #[tracing::instrument(name = "Add message", skip_all)]
    pub async fn add_message(&self, upload: TopicUpdateUpload) -> Result<ChainState, ServiceError> {
        let device_key = DeviceKey::try_from(upload.device_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("device key must be 32 bytes"))?;
        let token = AuthToken::try_from(upload.auth_token.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("auth token must be 16 bytes"))?;
        let topic_id = TopicId::try_from(upload.topic_id.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("topic id must be 12 bytes"))?;
        let update = upload
            .update
            .ok_or(ServiceError::InvalidRequest("missing topic update"))?;

        let (chain, targets) = {
            let mut state = self.lock()?;
            state.registry.authenticate_device(&device_key, &token)?;
            let entry = state
                .registry
                .topic(&topic_id)
                .ok_or(ServiceError::ResourceNotAvailable)?;
            let record = entry.info.clone();
            let prior = entry.chain.clone();

            validator::validate_topic_update(&update, &record, &upload.files, |id| {
                state.storage.file_exists(&topic_id, id)
            })?;

            for file in &update.files {
                let id = MessageId::try_from(file.id.as_slice())
                    .map_err(|_| ServiceError::InvalidRequest("file id must be 12 bytes"))?;
                if state.storage.file_exists(&topic_id, &id) {
                    continue;
                }
                let data = upload
                    .files
                    .iter()
                    .find(|candidate| candidate.id == file.id)
                    .map(|candidate| candidate.data.as_slice())
                    .ok_or(ServiceError::InvalidRequest(
                        "referenced file was never uploaded",
                    ))?;
                state.storage.store_file(&topic_id, &id, data)?;
            }

            let new_index = prior.chain_index + 1;
            let new_output =
                state
                    .storage
                    .append_update(&topic_id, &update, new_index, &prior.output)?;
            let chain = ChainState {
                chain_index: new_index,
                output: new_output,
            };
            let targets =
                state
                    .registry
                    .enqueue_message(&topic_id, chain.clone(), update, &device_key)?;
            state.snapshot();
            (chain, targets)
        };
        self.notify_all(targets).await;
        Ok(chain)
    }

    /// Reads a bounded range of committed updates; updates are indexed
    /// 1-based. Out-of-range requests yield an empty chain.
    #[tracing::instrument(name = "Get messages in range", skip_all)]
    pub async fn get_messages_in_range(
        &self,
        user: &UserKey,
        device: &DeviceKey,
        token: &AuthToken,
        topic_id: &TopicId,
        start: u32,
        count: u32,
    ) -> Result<MessageChain, ServiceError> {
        let state = self.lock()?;
        state.registry.authenticate_user(user, device, token)?;
        let entry = state
            .registry
            .topic(topic_id)
            .ok_or(ServiceError::ResourceNotAvailable)?;

        let end = start.saturating_add(count).min(entry.chain.chain_index + 1);
        if start == 0 || start >= end {
            return Ok(MessageChain::default());
        }
        let updates = state.storage.read_updates(topic_id, start, end - start)?;
        Ok(MessageChain { updates })
    }

    /// Returns a stored file to a topic member of any role.
    #[tracing::instrument(name = "Get file", skip_all)]
    pub async fn get_file(
        &self,
        user: &UserKey,
        device: &DeviceKey,
        token: &AuthToken,
        topic_id: &TopicId,
        message_id: &MessageId,
    ) -> Result<Vec<u8>, ServiceError> {
        let state = self.lock()?;
        state.registry.authenticate_user(user, device, token)?;
        let entry = state
            .registry
            .topic(topic_id)
            .ok_or(ServiceError::ResourceNotAvailable)?;
        let is_member = entry.info.members.iter().any(|member| {
            member
                .info
                .as_ref()
                .is_some_and(|info| info.user_key == user.as_slice())
        });
        if !is_member {
            return Err(ServiceError::AuthenticationFailed);
        }
        state.storage.read_file(topic_id, message_id)
    }
}
