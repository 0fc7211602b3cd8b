// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The Rendezvous wire schema.
//!
//! Every request and response body, every storage blob and the registry
//! snapshot are encoded with this schema. The messages are written out by
//! hand rather than generated: the field tags below are the wire contract,
//! and keeping them in source makes that contract reviewable.

mod signable;

pub use signable::{verify_key_pair, verify_signed, SignedPayload};

/// A name the admin has cleared for registration, together with the pin the
/// prospective user must present.
#[derive(Clone, PartialEq, prost::Message)]
pub struct AllowedUser {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint32, tag = "2")]
    pub pin: u32,
    /// Epoch seconds after which the pin is no longer valid.
    #[prost(uint64, tag = "3")]
    pub expiry: u64,
    #[prost(uint32, tag = "4")]
    pub tries_remaining: u32,
}

/// One device of a user.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Device {
    #[prost(bytes = "vec", tag = "1")]
    pub device_key: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub creation_time: u64,
    #[prost(bool, tag = "3")]
    pub is_active: bool,
    #[prost(string, tag = "4")]
    pub application: String,
}

/// The authoritative user record. Self-signed: `signature` is the Ed25519
/// signature under `identity_key` over the record encoded with
/// `signature = []`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct InternalUser {
    #[prost(bytes = "vec", tag = "1")]
    pub identity_key: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub creation_time: u64,
    #[prost(string, tag = "3")]
    pub name: String,
    /// Ascending by creation time; devices are appended at the tail.
    #[prost(message, repeated, tag = "4")]
    pub devices: Vec<Device>,
    /// Push server URL, may be empty.
    #[prost(string, tag = "5")]
    pub notification_server: String,
    #[prost(uint64, tag = "6")]
    pub timestamp: u64,
    #[prost(bytes = "vec", tag = "7")]
    pub signature: Vec<u8>,
}

/// A one-shot key a device publishes for topic-key delivery. Signed by the
/// owning device key.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DevicePrekey {
    #[prost(bytes = "vec", tag = "1")]
    pub pre_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
}

/// The prekey pool of one device. Doubles as the storage blob for
/// `users/<userKey>/prekeys/<deviceKey>`; in a [`DevicePreKeyBundle`] the
/// `device_key` and `remaining_keys` fields are populated.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DevicePreKeyList {
    #[prost(bytes = "vec", tag = "1")]
    pub device_key: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub prekeys: Vec<DevicePrekey>,
    #[prost(uint32, tag = "3")]
    pub remaining_keys: u32,
}

/// The result of consuming prekeys across all devices of one user.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DevicePreKeyBundle {
    #[prost(bytes = "vec", tag = "1")]
    pub user_key: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub devices: Vec<DevicePreKeyList>,
}

/// Upload of fresh prekeys for one device.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DevicePrekeyUploadRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub user_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub device_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub auth_token: Vec<u8>,
    #[prost(message, repeated, tag = "4")]
    pub prekeys: Vec<DevicePrekey>,
}

/// A per-topic key pair a user publishes. `signature` is by the user's
/// identity key over `signature_key ‖ encryption_key`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TopicKey {
    #[prost(bytes = "vec", tag = "1")]
    pub signature_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub encryption_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub signature: Vec<u8>,
}

/// Storage blob for `users/<userKey>/topickeys/<appId>`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TopicKeyList {
    #[prost(message, repeated, tag = "1")]
    pub keys: Vec<TopicKey>,
}

/// One encrypted copy of a topic key, addressed to a single device via one
/// of its prekeys.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TopicKeyMessage {
    /// The `signature_key` of the topic key this message wraps.
    #[prost(bytes = "vec", tag = "1")]
    pub signature_key: Vec<u8>,
    /// The receiver-device prekey the sender encrypted to.
    #[prost(bytes = "vec", tag = "2")]
    pub pre_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub message: Vec<u8>,
}

/// All topic-key messages addressed to one device.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TopicKeyMessageList {
    #[prost(bytes = "vec", tag = "1")]
    pub device_key: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub messages: Vec<TopicKeyMessage>,
}

/// Upload of fresh topic keys plus their encrypted copies for the
/// uploader's other devices.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TopicKeyBundle {
    #[prost(bytes = "vec", tag = "1")]
    pub user_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub device_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub auth_token: Vec<u8>,
    #[prost(string, tag = "4")]
    pub application: String,
    #[prost(message, repeated, tag = "5")]
    pub keys: Vec<TopicKey>,
    #[prost(message, repeated, tag = "6")]
    pub messages: Vec<TopicKeyMessageList>,
}

/// Bulk request for one topic key of each listed user.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TopicKeyRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub user_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub device_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub auth_token: Vec<u8>,
    #[prost(string, tag = "4")]
    pub application: String,
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub users: Vec<Vec<u8>>,
}

/// Response to a [`TopicKeyRequest`]; users with an empty queue are skipped.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TopicKeyResponse {
    #[prost(message, repeated, tag = "1")]
    pub users: Vec<topic_key_response::UserTopicKey>,
}

pub mod topic_key_response {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct UserTopicKey {
        #[prost(bytes = "vec", tag = "1")]
        pub user_key: Vec<u8>,
        #[prost(message, optional, tag = "2")]
        pub key: Option<super::TopicKey>,
    }
}

/// The role a member holds within a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum MemberRole {
    Admin = 0,
    Participant = 1,
    Observer = 2,
}

/// Binds a member's topic keys to their server identity. `signature` is by
/// `user_key` over the member's `signature_key ‖ encryption_key`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CreationInfo {
    #[prost(bytes = "vec", tag = "1")]
    pub user_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub encryption_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub signature: Vec<u8>,
}

/// One member of a topic.
#[derive(Clone, PartialEq, prost::Message)]
pub struct MemberInfo {
    /// The member's topic signature key; updates by this member are signed
    /// with it.
    #[prost(bytes = "vec", tag = "1")]
    pub signature_key: Vec<u8>,
    #[prost(enumeration = "MemberRole", tag = "2")]
    pub role: i32,
    #[prost(bytes = "vec", tag = "3")]
    pub encrypted_message_key: Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub info: Option<CreationInfo>,
}

/// The topic creation record. Self-signed by the creating member's topic
/// signature key (`members[index_of_message_creator]`).
#[derive(Clone, PartialEq, prost::Message)]
pub struct Topic {
    #[prost(bytes = "vec", tag = "1")]
    pub topic_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub application: String,
    #[prost(uint64, tag = "3")]
    pub creation_time: u64,
    #[prost(uint32, tag = "4")]
    pub index_of_message_creator: u32,
    #[prost(message, repeated, tag = "5")]
    pub members: Vec<MemberInfo>,
    #[prost(uint64, tag = "6")]
    pub timestamp: u64,
    #[prost(bytes = "vec", tag = "7")]
    pub signature: Vec<u8>,
}

/// Reference to an encrypted file carried by a topic update.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TopicFile {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    /// SHA-256 of the encrypted file content.
    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,
    /// Authentication tag of the file encryption.
    #[prost(bytes = "vec", tag = "3")]
    pub tag: Vec<u8>,
}

/// A signed append to a topic. Signed by the author's topic signature key.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TopicUpdate {
    #[prost(uint32, tag = "1")]
    pub index_in_member_list: u32,
    #[prost(message, repeated, tag = "2")]
    pub files: Vec<TopicFile>,
    #[prost(bytes = "vec", tag = "3")]
    pub metadata: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub signature: Vec<u8>,
}

/// File content uploaded alongside a topic update.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FileData {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

/// A topic update together with the file contents it references.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TopicUpdateUpload {
    #[prost(bytes = "vec", tag = "1")]
    pub device_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_token: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub topic_id: Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub update: Option<TopicUpdate>,
    #[prost(message, repeated, tag = "5")]
    pub files: Vec<FileData>,
}

/// A contiguous slice of a topic's updates. Doubles as the on-disk segment
/// blob (`topics/<topicId>/<chainBaseIndex>`, 1000 updates per segment).
#[derive(Clone, PartialEq, prost::Message)]
pub struct MessageChain {
    #[prost(message, repeated, tag = "1")]
    pub updates: Vec<TopicUpdate>,
}

/// The head of a topic's hash chain.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ChainState {
    /// Number of committed updates; updates are indexed 1-based.
    #[prost(uint32, tag = "1")]
    pub chain_index: u32,
    /// `output_0 = topicId`, `output_i = SHA256(output_{i-1} ‖ u_i.signature)`.
    #[prost(bytes = "vec", tag = "2")]
    pub output: Vec<u8>,
}

/// Server-side state of a topic.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TopicState {
    #[prost(message, optional, tag = "1")]
    pub info: Option<Topic>,
    #[prost(message, optional, tag = "2")]
    pub chain: Option<ChainState>,
}

/// A committed update as fanned out to member devices.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Message {
    #[prost(bytes = "vec", tag = "1")]
    pub topic_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub chain: Option<ChainState>,
    #[prost(message, optional, tag = "3")]
    pub content: Option<TopicUpdate>,
}

/// Per-sender, per-topic maximum chain index confirmed delivered.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Receipt {
    #[prost(bytes = "vec", tag = "1")]
    pub sender: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub topic_id: Vec<u8>,
    #[prost(uint32, tag = "3")]
    pub chain_index: u32,
}

/// Everything queued for one device, drained on poll.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceDownload {
    /// Topic creation records the device has not yet seen.
    #[prost(message, repeated, tag = "1")]
    pub topic_updates: Vec<Topic>,
    #[prost(message, repeated, tag = "2")]
    pub topic_key_messages: Vec<TopicKeyMessage>,
    #[prost(message, repeated, tag = "3")]
    pub messages: Vec<Message>,
    #[prost(message, repeated, tag = "4")]
    pub receipts: Vec<Receipt>,
    #[prost(uint32, tag = "5")]
    pub remaining_topic_keys: u32,
    #[prost(uint32, tag = "6")]
    pub remaining_pre_keys: u32,
}

/// Everything a new user submits in one request.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RegistrationBundle {
    #[prost(message, optional, tag = "1")]
    pub info: Option<InternalUser>,
    #[prost(uint32, tag = "2")]
    pub pin: u32,
    #[prost(message, repeated, tag = "3")]
    pub pre_keys: Vec<DevicePrekey>,
    #[prost(message, repeated, tag = "4")]
    pub topic_keys: Vec<TopicKey>,
}

/// The registry snapshot persisted as the `server` blob.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ManagementData {
    #[prost(bytes = "vec", tag = "1")]
    pub admin_token: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub allowed_users: Vec<AllowedUser>,
    #[prost(message, repeated, tag = "3")]
    pub users: Vec<InternalUser>,
    #[prost(message, repeated, tag = "4")]
    pub auth_tokens: Vec<management_data::DeviceToken>,
    #[prost(message, repeated, tag = "5")]
    pub notification_tokens: Vec<management_data::DeviceToken>,
    #[prost(message, repeated, tag = "6")]
    pub topics: Vec<TopicState>,
    #[prost(message, repeated, tag = "7")]
    pub mailboxes: Vec<management_data::StoredMailbox>,
    #[prost(message, repeated, tag = "8")]
    pub old_mailboxes: Vec<management_data::StoredMailbox>,
}

pub mod management_data {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct DeviceToken {
        #[prost(bytes = "vec", tag = "1")]
        pub device_key: Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub token: Vec<u8>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct StoredMailbox {
        #[prost(bytes = "vec", tag = "1")]
        pub device_key: Vec<u8>,
        #[prost(message, optional, tag = "2")]
        pub mailbox: Option<super::DeviceDownload>,
    }
}
