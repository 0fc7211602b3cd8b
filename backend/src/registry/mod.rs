// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The authoritative in-memory state: allowed and registered users, device
//! tokens, mailboxes and topic chain heads.
//!
//! All mutators are pure with respect to I/O. Fanout helpers return the
//! push notifications to send so the caller can invoke the push adapter
//! after the state lock is released. Every mutation flags the registry
//! dirty; the request pipeline decides when to snapshot.

mod mailbox;

pub use mailbox::Mailbox;

use std::collections::HashMap;

use rdvcommon::{
    identifiers::{AuthToken, DeviceKey, TopicId, UserKey},
    time::Timestamp,
    ServiceError,
};
use rdvprotos::{
    management_data::{DeviceToken, StoredMailbox},
    AllowedUser, ChainState, DeviceDownload, InternalUser, ManagementData, Message, Topic,
    TopicKeyMessageList, TopicState, TopicUpdate,
};
use tracing::warn;

use crate::push::PushTarget;

/// Server-side state of one topic: the creation record and the chain head.
#[derive(Debug, Clone)]
pub struct TopicEntry {
    pub info: Topic,
    pub chain: ChainState,
}

#[derive(Debug)]
pub struct Registry {
    admin_token: AuthToken,
    allowed_users: HashMap<String, AllowedUser>,
    users: HashMap<UserKey, InternalUser>,
    auth_tokens: HashMap<DeviceKey, AuthToken>,
    notification_tokens: HashMap<DeviceKey, Vec<u8>>,
    mailboxes: HashMap<DeviceKey, Mailbox>,
    old_mailboxes: HashMap<DeviceKey, Mailbox>,
    topics: HashMap<TopicId, TopicEntry>,
    dirty: bool,
}

impl Registry {
    pub fn new(admin_token: AuthToken) -> Self {
        Self {
            admin_token,
            allowed_users: HashMap::new(),
            users: HashMap::new(),
            auth_tokens: HashMap::new(),
            notification_tokens: HashMap::new(),
            mailboxes: HashMap::new(),
            old_mailboxes: HashMap::new(),
            topics: HashMap::new(),
            dirty: true,
        }
    }

    fn touch(&mut self) {
        self.dirty = true;
    }

    /// Clears the dirty flag, returning whether a snapshot is due.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    // Admin surface

    pub fn admin_token(&self) -> &AuthToken {
        &self.admin_token
    }

    pub fn verify_admin(&self, token: &AuthToken) -> Result<(), ServiceError> {
        if &self.admin_token == token {
            Ok(())
        } else {
            Err(ServiceError::AuthenticationFailed)
        }
    }

    pub fn set_admin_token(&mut self, token: AuthToken) {
        self.admin_token = token;
        self.touch();
    }

    /// Drops everything except the admin token.
    pub fn reset(&mut self) {
        self.allowed_users.clear();
        self.users.clear();
        self.auth_tokens.clear();
        self.notification_tokens.clear();
        self.mailboxes.clear();
        self.old_mailboxes.clear();
        self.topics.clear();
        self.touch();
    }

    // Registration gate

    pub fn allow(&mut self, entry: AllowedUser) {
        self.allowed_users.insert(entry.name.clone(), entry);
        self.touch();
    }

    pub fn remove_allowed(&mut self, name: &str) {
        if self.allowed_users.remove(name).is_some() {
            self.touch();
        }
    }

    /// The registration gate. A wrong pin burns one try; the third burned
    /// try and an expired pin evict the entry.
    pub fn can_register(&mut self, name: &str, pin: u32, now: Timestamp) -> bool {
        let Some(entry) = self.allowed_users.get_mut(name) else {
            return false;
        };
        if Timestamp::from_seconds(entry.expiry).is_before(now) {
            self.allowed_users.remove(name);
            self.touch();
            return false;
        }
        if entry.pin == pin {
            return true;
        }
        if entry.tries_remaining <= 1 {
            warn!(name, "registration pin tries exhausted");
            self.allowed_users.remove(name);
        } else {
            entry.tries_remaining -= 1;
        }
        self.touch();
        false
    }

    // Users and devices

    pub fn user(&self, user: &UserKey) -> Option<&InternalUser> {
        self.users.get(user)
    }

    pub fn has_user_named(&self, name: &str) -> bool {
        self.users.values().any(|user| user.name == name)
    }

    pub fn device_key_in_use(&self, device: &DeviceKey) -> bool {
        self.users
            .values()
            .any(|user| user.devices.iter().any(|d| d.device_key == device.as_slice()))
    }

    pub fn insert_user(&mut self, user: InternalUser) -> Result<UserKey, ServiceError> {
        let key = UserKey::try_from(user.identity_key.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("identity key must be 32 bytes"))?;
        self.users.insert(key, user);
        self.touch();
        Ok(key)
    }

    pub fn remove_user(&mut self, user: &UserKey) -> Option<InternalUser> {
        let removed = self.users.remove(user);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    // Device tokens and mailboxes

    pub fn insert_auth_token(&mut self, device: DeviceKey, token: AuthToken) {
        self.auth_tokens.insert(device, token);
        self.touch();
    }

    pub fn set_notification_token(&mut self, device: DeviceKey, token: Vec<u8>) {
        self.notification_tokens.insert(device, token);
        self.touch();
    }

    pub fn create_mailbox(
        &mut self,
        device: DeviceKey,
        remaining_pre_keys: u32,
        remaining_topic_keys: u32,
    ) {
        self.mailboxes.insert(
            device,
            Mailbox::with_counters(remaining_pre_keys, remaining_topic_keys),
        );
        self.touch();
    }

    /// Removes every piece of per-device state: auth token, push token and
    /// both mailbox generations.
    pub fn remove_device_state(&mut self, device: &DeviceKey) {
        self.auth_tokens.remove(device);
        self.notification_tokens.remove(device);
        self.mailboxes.remove(device);
        self.old_mailboxes.remove(device);
        self.touch();
    }

    fn mailbox_mut(&mut self, device: DeviceKey) -> &mut Mailbox {
        self.mailboxes.entry(device).or_default()
    }

    pub fn set_remaining_pre_keys(&mut self, device: DeviceKey, count: u32) {
        self.mailbox_mut(device).set_remaining_pre_keys(count);
        self.touch();
    }

    /// Sets the topic-key counter on every device mailbox of the user.
    pub fn set_remaining_topic_keys(&mut self, user: &UserKey, count: u32) {
        let devices = self.device_keys_of(user);
        for device in devices {
            self.mailbox_mut(device).set_remaining_topic_keys(count);
        }
        self.touch();
    }

    /// Empties the device's mailbox, retaining the drained snapshot as the
    /// previous generation for one retry.
    pub fn drain_mailbox(&mut self, device: &DeviceKey) -> DeviceDownload {
        let drained = self.mailbox_mut(*device).drain();
        self.old_mailboxes
            .insert(*device, Mailbox::from_download(drained.clone()));
        self.touch();
        drained
    }

    fn device_keys_of(&self, user: &UserKey) -> Vec<DeviceKey> {
        self.users
            .get(user)
            .map(|user| {
                user.devices
                    .iter()
                    .filter_map(|d| DeviceKey::try_from(d.device_key.as_slice()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    // Authentication

    pub fn authenticate_user(
        &self,
        user: &UserKey,
        device: &DeviceKey,
        token: &AuthToken,
    ) -> Result<InternalUser, ServiceError> {
        let record = self
            .users
            .get(user)
            .ok_or(ServiceError::AuthenticationFailed)?;
        if !record
            .devices
            .iter()
            .any(|d| d.device_key == device.as_slice())
        {
            return Err(ServiceError::AuthenticationFailed);
        }
        self.authenticate_device(device, token)?;
        Ok(record.clone())
    }

    pub fn authenticate_device(
        &self,
        device: &DeviceKey,
        token: &AuthToken,
    ) -> Result<(), ServiceError> {
        let stored = self
            .auth_tokens
            .get(device)
            .ok_or(ServiceError::AuthenticationFailed)?;
        if stored == token {
            Ok(())
        } else {
            Err(ServiceError::AuthenticationFailed)
        }
    }

    // Topics

    pub fn topic(&self, topic: &TopicId) -> Option<&TopicEntry> {
        self.topics.get(topic)
    }

    /// Seeds a topic with chain head `(0, topicId)`.
    pub fn insert_topic(&mut self, topic_id: TopicId, info: Topic) {
        self.topics.insert(
            topic_id,
            TopicEntry {
                info,
                chain: ChainState {
                    chain_index: 0,
                    output: topic_id.to_vec(),
                },
            },
        );
        self.touch();
    }

    // Fanout

    /// Appends the topic record to the mailbox of every member device that
    /// is active in the topic's application, except `except`.
    pub fn enqueue_topic_update(
        &mut self,
        record: &Topic,
        except: Option<&DeviceKey>,
    ) -> Vec<PushTarget> {
        let fanout = self.fanout_devices(record, except);
        let mut targets = Vec::new();
        for (device, target) in fanout {
            self.mailbox_mut(device).push_topic(record.clone());
            targets.extend(target);
        }
        self.touch();
        targets
    }

    /// Advances the topic's chain head and fans the committed message out
    /// to every member device except the sender.
    pub fn enqueue_message(
        &mut self,
        topic_id: &TopicId,
        chain: ChainState,
        content: TopicUpdate,
        sender: &DeviceKey,
    ) -> Result<Vec<PushTarget>, ServiceError> {
        let entry = self
            .topics
            .get_mut(topic_id)
            .ok_or(ServiceError::ResourceNotAvailable)?;
        entry.chain = chain.clone();
        let record = entry.info.clone();

        let fanout = self.fanout_devices(&record, Some(sender));
        let mut targets = Vec::new();
        for (device, target) in fanout {
            self.mailbox_mut(device).push_message(Message {
                topic_id: topic_id.to_vec(),
                chain: Some(chain.clone()),
                content: Some(content.clone()),
            });
            targets.extend(target);
        }
        self.touch();
        Ok(targets)
    }

    /// Appends per-device topic-key messages to the owner's other devices.
    pub fn enqueue_topic_key_messages(
        &mut self,
        owner: &UserKey,
        lists: &[TopicKeyMessageList],
    ) -> Vec<PushTarget> {
        let owner_record = self.users.get(owner).cloned();
        let mut targets = Vec::new();
        for list in lists {
            let Ok(device) = DeviceKey::try_from(list.device_key.as_slice()) else {
                continue;
            };
            let target = owner_record
                .as_ref()
                .and_then(|user| self.push_target(user, &device));
            self.mailbox_mut(device).push_key_messages(&list.messages);
            targets.extend(target);
        }
        self.touch();
        targets
    }

    /// Raises the `(sender, topic)` receipts on every recipient device
    /// active in `application`. Only newly-advanced entries produce push
    /// notifications.
    pub fn enqueue_delivery_receipts(
        &mut self,
        recipients: &[UserKey],
        sender: &UserKey,
        per_topic_max: &[(TopicId, u32)],
        application: &str,
    ) -> Vec<PushTarget> {
        let mut devices = Vec::new();
        for recipient in recipients {
            let Some(user) = self.users.get(recipient) else {
                continue;
            };
            for device in &user.devices {
                if !device.is_active || device.application != application {
                    continue;
                }
                let Ok(key) = DeviceKey::try_from(device.device_key.as_slice()) else {
                    continue;
                };
                devices.push((key, self.push_target(user, &key)));
            }
        }

        let mut targets = Vec::new();
        for (device, target) in devices {
            let mut advanced = false;
            for (topic, chain_index) in per_topic_max {
                advanced |= self
                    .mailbox_mut(device)
                    .advance_receipt(sender, topic, *chain_index);
            }
            if advanced {
                targets.extend(target);
            }
        }
        self.touch();
        targets
    }

    /// The member devices a topic record fans out to, with the push target
    /// for each device that can be woken.
    fn fanout_devices(
        &self,
        record: &Topic,
        except: Option<&DeviceKey>,
    ) -> Vec<(DeviceKey, Option<PushTarget>)> {
        let mut devices = Vec::new();
        for member in &record.members {
            let Some(info) = member.info.as_ref() else {
                continue;
            };
            let Ok(user_key) = UserKey::try_from(info.user_key.as_slice()) else {
                continue;
            };
            let Some(user) = self.users.get(&user_key) else {
                continue;
            };
            for device in &user.devices {
                if !device.is_active || device.application != record.application {
                    continue;
                }
                let Ok(key) = DeviceKey::try_from(device.device_key.as_slice()) else {
                    continue;
                };
                if except == Some(&key) {
                    continue;
                }
                devices.push((key, self.push_target(user, &key)));
            }
        }
        devices
    }

    fn push_target(&self, user: &InternalUser, device: &DeviceKey) -> Option<PushTarget> {
        if user.notification_server.is_empty() {
            return None;
        }
        let token = self.notification_tokens.get(device)?;
        Some(PushTarget {
            server: user.notification_server.clone(),
            token: token.clone(),
        })
    }

    /// Plain-text listing of registered users and pending registrations
    /// for the admin console.
    pub fn accounts_listing(&self) -> String {
        let mut lines: Vec<String> = self
            .users
            .values()
            .map(|user| format!("user {} ({} devices)", user.name, user.devices.len()))
            .chain(self.allowed_users.values().map(|allowed| {
                format!(
                    "allowed {} (tries remaining: {})",
                    allowed.name, allowed.tries_remaining
                )
            }))
            .collect();
        lines.sort();
        lines.join("\n")
    }

    // Snapshots

    pub fn management_data(&self) -> ManagementData {
        ManagementData {
            admin_token: self.admin_token.to_vec(),
            allowed_users: self.allowed_users.values().cloned().collect(),
            users: self.users.values().cloned().collect(),
            auth_tokens: self
                .auth_tokens
                .iter()
                .map(|(device, token)| DeviceToken {
                    device_key: device.to_vec(),
                    token: token.to_vec(),
                })
                .collect(),
            notification_tokens: self
                .notification_tokens
                .iter()
                .map(|(device, token)| DeviceToken {
                    device_key: device.to_vec(),
                    token: token.clone(),
                })
                .collect(),
            topics: self
                .topics
                .values()
                .map(|entry| TopicState {
                    info: Some(entry.info.clone()),
                    chain: Some(entry.chain.clone()),
                })
                .collect(),
            mailboxes: stored_mailboxes(&self.mailboxes),
            old_mailboxes: stored_mailboxes(&self.old_mailboxes),
        }
    }

    pub fn restore(data: ManagementData) -> Result<Self, ServiceError> {
        let corrupt = |what: &str| ServiceError::Internal(format!("corrupt snapshot: {what}"));
        let admin_token = AuthToken::try_from(data.admin_token.as_slice())
            .map_err(|_| corrupt("admin token"))?;

        let mut registry = Self::new(admin_token);
        for entry in data.allowed_users {
            registry.allowed_users.insert(entry.name.clone(), entry);
        }
        for user in data.users {
            let key = UserKey::try_from(user.identity_key.as_slice())
                .map_err(|_| corrupt("user key"))?;
            registry.users.insert(key, user);
        }
        for entry in data.auth_tokens {
            registry.auth_tokens.insert(
                DeviceKey::try_from(entry.device_key.as_slice())
                    .map_err(|_| corrupt("device key"))?,
                AuthToken::try_from(entry.token.as_slice()).map_err(|_| corrupt("auth token"))?,
            );
        }
        for entry in data.notification_tokens {
            registry.notification_tokens.insert(
                DeviceKey::try_from(entry.device_key.as_slice())
                    .map_err(|_| corrupt("device key"))?,
                entry.token,
            );
        }
        for state in data.topics {
            let info = state.info.ok_or_else(|| corrupt("topic record"))?;
            let chain = state.chain.ok_or_else(|| corrupt("chain state"))?;
            let topic_id =
                TopicId::try_from(info.topic_id.as_slice()).map_err(|_| corrupt("topic id"))?;
            registry.topics.insert(topic_id, TopicEntry { info, chain });
        }
        registry.mailboxes = restored_mailboxes(data.mailboxes)?;
        registry.old_mailboxes = restored_mailboxes(data.old_mailboxes)?;
        registry.dirty = false;
        Ok(registry)
    }
}

fn stored_mailboxes(mailboxes: &HashMap<DeviceKey, Mailbox>) -> Vec<StoredMailbox> {
    mailboxes
        .iter()
        .map(|(device, mailbox)| StoredMailbox {
            device_key: device.to_vec(),
            mailbox: Some(mailbox.download().clone()),
        })
        .collect()
}

fn restored_mailboxes(
    stored: Vec<StoredMailbox>,
) -> Result<HashMap<DeviceKey, Mailbox>, ServiceError> {
    stored
        .into_iter()
        .map(|entry| {
            let device = DeviceKey::try_from(entry.device_key.as_slice()).map_err(|_| {
                ServiceError::Internal("corrupt snapshot: mailbox device key".into())
            })?;
            Ok((
                device,
                Mailbox::from_download(entry.mailbox.unwrap_or_default()),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdvprotos::Device;

    fn user_record(identity: u8, devices: &[(u8, bool)]) -> InternalUser {
        InternalUser {
            identity_key: vec![identity; 32],
            creation_time: 1,
            name: format!("user-{identity}"),
            devices: devices
                .iter()
                .map(|(byte, active)| Device {
                    device_key: vec![*byte; 32],
                    creation_time: 1,
                    is_active: *active,
                    application: "chat".into(),
                })
                .collect(),
            notification_server: String::new(),
            timestamp: 1,
            signature: vec![0; 64],
        }
    }

    #[test]
    fn pin_lockout_evicts_after_three_tries() {
        let mut registry = Registry::new(AuthToken::new([0; 16]));
        let now = Timestamp::from_seconds(1000);
        registry.allow(AllowedUser {
            name: "bob".into(),
            pin: 11111,
            expiry: 2000,
            tries_remaining: 3,
        });

        for _ in 0..3 {
            assert!(!registry.can_register("bob", 22222, now));
        }
        // Entry evicted, the correct pin no longer works.
        assert!(!registry.can_register("bob", 11111, now));
    }

    #[test]
    fn expired_pin_is_evicted() {
        let mut registry = Registry::new(AuthToken::new([0; 16]));
        registry.allow(AllowedUser {
            name: "carol".into(),
            pin: 123,
            expiry: 500,
            tries_remaining: 3,
        });
        assert!(!registry.can_register("carol", 123, Timestamp::from_seconds(501)));
        assert!(!registry.can_register("carol", 123, Timestamp::from_seconds(400)));
    }

    #[test]
    fn authenticate_user_requires_device_ownership() {
        let mut registry = Registry::new(AuthToken::new([0; 16]));
        registry.insert_user(user_record(1, &[(2, true)])).unwrap();
        let device = DeviceKey::new([2; 32]);
        let foreign_device = DeviceKey::new([3; 32]);
        let token = AuthToken::new([7; 16]);
        registry.insert_auth_token(device, token);
        registry.insert_auth_token(foreign_device, token);

        let user = UserKey::new([1; 32]);
        assert!(registry.authenticate_user(&user, &device, &token).is_ok());
        assert!(registry
            .authenticate_user(&user, &foreign_device, &token)
            .is_err());
        assert!(registry
            .authenticate_user(&user, &device, &AuthToken::new([8; 16]))
            .is_err());
    }

    #[test]
    fn snapshot_roundtrip_preserves_state() {
        let mut registry = Registry::new(AuthToken::new([1; 16]));
        registry.insert_user(user_record(1, &[(2, true)])).unwrap();
        registry.insert_auth_token(DeviceKey::new([2; 32]), AuthToken::new([9; 16]));
        registry.create_mailbox(DeviceKey::new([2; 32]), 3, 4);
        registry.allow(AllowedUser {
            name: "dave".into(),
            pin: 42,
            expiry: 99,
            tries_remaining: 2,
        });

        let restored = Registry::restore(registry.management_data()).unwrap();
        assert_eq!(restored.admin_token(), registry.admin_token());
        assert_eq!(restored.users, registry.users);
        assert_eq!(restored.allowed_users, registry.allowed_users);
        assert_eq!(
            restored
                .mailboxes
                .get(&DeviceKey::new([2; 32]))
                .unwrap()
                .download()
                .remaining_pre_keys,
            3
        );
    }
}
