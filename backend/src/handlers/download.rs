// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The device download endpoint: drains the mailbox and turns the drained
//! messages into delivery receipts for the other topic members.

use std::collections::HashMap;

use rdvcommon::{
    identifiers::{AuthToken, DeviceKey, TopicId, UserKey},
    ServiceError,
};
use rdvprotos::DeviceDownload;

use crate::{push::PushNotificationProvider, Rendezvous};

impl<P: PushNotificationProvider> Rendezvous<P> {
    /// Drains everything queued for the device. For every topic with
    /// drained messages, the highest delivered chain index is advertised
    /// back to all member devices as a delivery receipt; only receipts
    /// that actually advance produce push notifications.
    #[tracing::instrument(name = "Get messages for device", skip_all)]
    pub async fn get_messages_for_device(
        &self,
        user: &UserKey,
        device: &DeviceKey,
        token: &AuthToken,
    ) -> Result<DeviceDownload, ServiceError> {
        let (download, targets) = {
            let mut state = self.lock()?;
            state.registry.authenticate_user(user, device, token)?;
            let download = state.registry.drain_mailbox(device);

            let mut per_topic: HashMap<TopicId, u32> = HashMap::new();
            for message in &download.messages {
                let (Ok(topic_id), Some(chain)) = (
                    TopicId::try_from(message.topic_id.as_slice()),
                    message.chain.as_ref(),
                ) else {
                    continue;
                };
                let max = per_topic.entry(topic_id).or_default();
                *max = (*max).max(chain.chain_index);
            }

            let mut targets = Vec::new();
            for (topic_id, chain_index) in per_topic {
                let Some(entry) = state.registry.topic(&topic_id) else {
                    continue;
                };
                let application = entry.info.application.clone();
                let members: Vec<UserKey> = entry
                    .info
                    .members
                    .iter()
                    .filter_map(|member| member.info.as_ref())
                    .filter_map(|info| UserKey::try_from(info.user_key.as_slice()).ok())
                    .collect();
                targets.extend(state.registry.enqueue_delivery_receipts(
                    &members,
                    user,
                    &[(topic_id, chain_index)],
                    &application,
                ));
            }
            state.snapshot();
            (download, targets)
        };
        self.notify_all(targets).await;
        Ok(download)
    }
}
