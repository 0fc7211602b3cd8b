// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Opaque encrypted file blobs, one per (topic, message id).

use std::fs;

use rdvcommon::{
    identifiers::{MessageId, TopicId},
    ServiceError,
};

use super::Storage;

impl Storage {
    /// Stores a file blob. Fails with
    /// [`ServiceError::ResourceAlreadyExists`] if the blob exists; callers
    /// that want idempotence check [`Storage::file_exists`] first.
    pub fn store_file(
        &self,
        topic: &TopicId,
        message: &MessageId,
        bytes: &[u8],
    ) -> Result<(), ServiceError> {
        let path = self.file_path(topic, message);
        if path.exists() {
            return Err(ServiceError::ResourceAlreadyExists);
        }
        super::write_atomic(&path, bytes)
    }

    pub fn read_file(&self, topic: &TopicId, message: &MessageId) -> Result<Vec<u8>, ServiceError> {
        let path = self.file_path(topic, message);
        if !path.exists() {
            return Err(ServiceError::ResourceNotAvailable);
        }
        Ok(fs::read(path)?)
    }

    pub fn file_exists(&self, topic: &TopicId, message: &MessageId) -> bool {
        self.file_path(topic, message).exists()
    }

    fn file_path(&self, topic: &TopicId, message: &MessageId) -> std::path::PathBuf {
        self.file_dir(topic).join(message.to_string())
    }
}
