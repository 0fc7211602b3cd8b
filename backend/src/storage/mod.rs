// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Durable per-entity blobs, laid out as a directory tree under a base
//! path:
//!
//! ```text
//! base/server                                  registry snapshot
//! base/users/<userKey>/prekeys/<deviceKey>     DevicePreKeyList
//! base/users/<userKey>/topickeys/<appId>       TopicKeyList
//! base/topics/<topicId>/<chainBaseIndex>       MessageChain segment
//! base/files/<topicId>/<messageId>             encrypted file blob
//! ```
//!
//! Binary ids render as unpadded base32, application ids as URL-safe
//! base64. All blob writes go through a write-to-temp-then-rename cycle so
//! a crashed write never leaves a truncated blob behind.

mod chain;
mod files;
mod prekeys;
mod topic_keys;

pub use chain::SEGMENT_LENGTH;

use std::{
    fs,
    path::{Path, PathBuf},
};

use rdvcommon::{
    identifiers::{AppId, DeviceKey, TopicId, UserKey},
    ServiceError,
};
use tracing::info;

const SNAPSHOT_FILE: &str = "server";
const USERS_DIR: &str = "users";
const TOPICS_DIR: &str = "topics";
const FILES_DIR: &str = "files";
const PREKEYS_DIR: &str = "prekeys";
const TOPIC_KEYS_DIR: &str = "topickeys";

#[derive(Debug)]
pub struct Storage {
    base: PathBuf,
}

impl Storage {
    /// Creates the directory tree and self-tests write, read and delete on
    /// the base directory. Construction fails if any of the probes fail.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let storage = Self { base: base.into() };
        storage.create_tree()?;
        storage.self_test()?;
        info!(base = %storage.base.display(), "storage initialized");
        Ok(storage)
    }

    fn create_tree(&self) -> Result<(), ServiceError> {
        fs::create_dir_all(self.base.join(USERS_DIR))?;
        fs::create_dir_all(self.base.join(TOPICS_DIR))?;
        fs::create_dir_all(self.base.join(FILES_DIR))?;
        Ok(())
    }

    fn self_test(&self) -> Result<(), ServiceError> {
        let probe = self.base.join(".probe");
        let content = b"rendezvous storage probe";
        fs::write(&probe, content)?;
        let read_back = fs::read(&probe)?;
        if read_back != content {
            return Err(ServiceError::Internal(
                "storage self-test read back different content".into(),
            ));
        }
        fs::remove_file(&probe)?;
        Ok(())
    }

    /// Deletes every blob and recreates the empty tree.
    pub fn delete_all(&self) -> Result<(), ServiceError> {
        for entry in fs::read_dir(&self.base)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        self.create_tree()?;
        self.self_test()
    }

    // Path layout

    fn user_dir(&self, user: &UserKey) -> PathBuf {
        self.base.join(USERS_DIR).join(user.to_string())
    }

    fn prekey_path(&self, user: &UserKey, device: &DeviceKey) -> PathBuf {
        self.user_dir(user).join(PREKEYS_DIR).join(device.to_string())
    }

    fn topic_key_path(&self, user: &UserKey, app: &AppId) -> PathBuf {
        self.user_dir(user)
            .join(TOPIC_KEYS_DIR)
            .join(app.path_segment())
    }

    fn topic_dir(&self, topic: &TopicId) -> PathBuf {
        self.base.join(TOPICS_DIR).join(topic.to_string())
    }

    fn file_dir(&self, topic: &TopicId) -> PathBuf {
        self.base.join(FILES_DIR).join(topic.to_string())
    }

    // User and topic trees

    pub fn create_user_tree(&self, user: &UserKey) -> Result<(), ServiceError> {
        fs::create_dir_all(self.user_dir(user).join(PREKEYS_DIR))?;
        fs::create_dir_all(self.user_dir(user).join(TOPIC_KEYS_DIR))?;
        Ok(())
    }

    pub fn delete_user_tree(&self, user: &UserKey) -> Result<(), ServiceError> {
        let dir = self.user_dir(user);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn has_topic(&self, topic: &TopicId) -> bool {
        self.topic_dir(topic).exists()
    }

    pub fn create_topic_tree(&self, topic: &TopicId) -> Result<(), ServiceError> {
        fs::create_dir_all(self.topic_dir(topic))?;
        fs::create_dir_all(self.file_dir(topic))?;
        Ok(())
    }

    // Registry snapshot

    pub fn write_snapshot(&self, bytes: &[u8]) -> Result<(), ServiceError> {
        write_atomic(&self.base.join(SNAPSHOT_FILE), bytes)
    }

    pub fn read_snapshot(&self) -> Result<Option<Vec<u8>>, ServiceError> {
        let path = self.base.join(SNAPSHOT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ServiceError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Removes a blob, treating a missing file as already removed.
fn remove_if_present(path: &Path) -> Result<(), ServiceError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
