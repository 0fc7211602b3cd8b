// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-(user, application) topic-key queues. One `TopicKeyList` blob per
//! queue; consumption takes from the tail.

use std::fs;

use prost::Message;
use rdvcommon::{
    identifiers::{AppId, UserKey},
    ServiceError,
};

use super::{remove_if_present, write_atomic, Storage};
use rdvprotos::{TopicKey, TopicKeyList};

impl Storage {
    /// Appends fresh topic keys to the queue and returns the new queue
    /// length.
    pub fn store_topic_keys(
        &self,
        user: &UserKey,
        app: &AppId,
        new_keys: &[TopicKey],
    ) -> Result<usize, ServiceError> {
        let path = self.topic_key_path(user, app);
        let mut list = self.load_topic_keys(user, app)?;
        list.keys.extend_from_slice(new_keys);
        write_atomic(&path, &list.encode_to_vec())?;
        Ok(list.keys.len())
    }

    /// Takes one key from the tail of the queue. Fails with
    /// [`ServiceError::ResourceNotAvailable`] when the queue is empty.
    pub fn consume_topic_key(&self, user: &UserKey, app: &AppId) -> Result<TopicKey, ServiceError> {
        let path = self.topic_key_path(user, app);
        let mut list = self.load_topic_keys(user, app)?;
        let key = list.keys.pop().ok_or(ServiceError::ResourceNotAvailable)?;
        if list.keys.is_empty() {
            remove_if_present(&path)?;
        } else {
            write_atomic(&path, &list.encode_to_vec())?;
        }
        Ok(key)
    }

    pub fn count_topic_keys(&self, user: &UserKey, app: &AppId) -> Result<usize, ServiceError> {
        Ok(self.load_topic_keys(user, app)?.keys.len())
    }

    fn load_topic_keys(&self, user: &UserKey, app: &AppId) -> Result<TopicKeyList, ServiceError> {
        let path = self.topic_key_path(user, app);
        if !path.exists() {
            return Ok(TopicKeyList::default());
        }
        Ok(TopicKeyList::decode(fs::read(path)?.as_slice())?)
    }
}
