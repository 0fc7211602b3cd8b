// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Stateless request checks, composed by the handlers: freshness gates,
//! the signed-record conventions, and the structural invariants on user
//! mutations, topic creation and topic updates.

use rdvcommon::{
    crypto,
    identifiers::{AppId, DeviceKey, MessageId, TopicId, UserKey, MAX_NAME_LENGTH},
    time::Timestamp,
    ServiceError,
};
use rdvprotos::{
    verify_signed, Device, FileData, InternalUser, MemberInfo, MemberRole, Topic, TopicUpdate,
};

/// Maximum size of the opaque metadata carried by a topic update.
pub const MAX_METADATA_LENGTH: usize = 100;

const FILE_HASH_LENGTH: usize = 32;
const FILE_TAG_LENGTH: usize = 16;

/// Rejects timestamps outside the freshness window around `now`.
pub fn ensure_fresh(timestamp: u64, now: Timestamp) -> Result<(), ServiceError> {
    if Timestamp::from_seconds(timestamp).is_fresh(now) {
        Ok(())
    } else {
        Err(ServiceError::RequestOutdated)
    }
}

/// Checks a user record's self-signature under its own identity key.
pub fn verify_self_signed(user: &InternalUser) -> Result<(), ServiceError> {
    UserKey::try_from(user.identity_key.as_slice())
        .map_err(|_| ServiceError::InvalidRequest("identity key must be 32 bytes"))?;
    verify_signed(user, &user.identity_key)
}

/// Structural checks on a brand-new user record: exactly one device, a
/// plausible name, a valid application id and a usable notification server.
pub fn validate_new_user(user: &InternalUser) -> Result<(DeviceKey, AppId), ServiceError> {
    validate_name(&user.name)?;
    if user.devices.len() != 1 {
        return Err(ServiceError::InvalidRequest(
            "registration must carry exactly one device",
        ));
    }
    let device = &user.devices[0];
    let device_key = DeviceKey::try_from(device.device_key.as_slice())
        .map_err(|_| ServiceError::InvalidRequest("device key must be 32 bytes"))?;
    let app = AppId::new(&device.application)
        .map_err(|_| ServiceError::InvalidRequest("invalid application id"))?;
    validate_notification_server(&user.notification_server)?;
    Ok((device_key, app))
}

pub fn validate_name(name: &str) -> Result<(), ServiceError> {
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(ServiceError::InvalidRequest("invalid user name"));
    }
    Ok(())
}

pub fn validate_notification_server(server: &str) -> Result<(), ServiceError> {
    if server.is_empty() {
        return Ok(());
    }
    url::Url::parse(server)
        .map(|_| ())
        .map_err(|_| ServiceError::InvalidRequest("notification server is not a valid URL"))
}

/// Checks that `new` is `old` with exactly one device appended at the tail
/// and a strictly newer timestamp; all other fields must be unchanged.
/// Returns the appended device.
pub fn validate_device_added<'a>(
    old: &InternalUser,
    new: &'a InternalUser,
) -> Result<&'a Device, ServiceError> {
    validate_unchanged_fields(old, new)?;
    if new.devices.len() != old.devices.len() + 1 {
        return Err(ServiceError::InvalidRequest(
            "exactly one device must be added",
        ));
    }
    if new.devices[..old.devices.len()] != old.devices[..] {
        return Err(ServiceError::InvalidRequest(
            "existing devices must be unchanged",
        ));
    }
    let added = new.devices.last().expect("non-empty by length check");
    DeviceKey::try_from(added.device_key.as_slice())
        .map_err(|_| ServiceError::InvalidRequest("device key must be 32 bytes"))?;
    AppId::new(&added.application)
        .map_err(|_| ServiceError::InvalidRequest("invalid application id"))?;
    Ok(added)
}

/// Checks that `new` is `old` with exactly one device removed (order
/// otherwise preserved) and a strictly newer timestamp. Returns the removed
/// device.
pub fn validate_device_removed(
    old: &InternalUser,
    new: &InternalUser,
) -> Result<Device, ServiceError> {
    validate_unchanged_fields(old, new)?;
    if new.devices.len() + 1 != old.devices.len() {
        return Err(ServiceError::InvalidRequest(
            "exactly one device must be removed",
        ));
    }
    let mut removed = None;
    let mut remaining = new.devices.iter();
    let mut next = remaining.next();
    for device in &old.devices {
        if next.is_some_and(|kept| kept == device) {
            next = remaining.next();
        } else if removed.is_none() {
            removed = Some(device.clone());
        } else {
            return Err(ServiceError::InvalidRequest(
                "remaining devices must be unchanged",
            ));
        }
    }
    if next.is_some() {
        return Err(ServiceError::InvalidRequest(
            "remaining devices must be unchanged",
        ));
    }
    removed.ok_or(ServiceError::InvalidRequest(
        "exactly one device must be removed",
    ))
}

fn validate_unchanged_fields(old: &InternalUser, new: &InternalUser) -> Result<(), ServiceError> {
    if new.timestamp <= old.timestamp {
        return Err(ServiceError::RequestOutdated);
    }
    if new.identity_key != old.identity_key
        || new.creation_time != old.creation_time
        || new.name != old.name
        || new.notification_server != old.notification_server
    {
        return Err(ServiceError::InvalidRequest(
            "only the device list may change",
        ));
    }
    Ok(())
}

/// The invariants of a topic creation record, checked against the
/// authenticated creator. Existence of the listed users is the caller's
/// concern; everything record-local happens here.
pub fn validate_topic_creation(
    topic: &Topic,
    creator: &UserKey,
    now: Timestamp,
) -> Result<TopicId, ServiceError> {
    ensure_fresh(topic.timestamp, now)?;
    if topic.creation_time != topic.timestamp {
        return Err(ServiceError::InvalidRequest(
            "creation time must equal the record timestamp",
        ));
    }
    let topic_id = TopicId::try_from(topic.topic_id.as_slice())
        .map_err(|_| ServiceError::InvalidRequest("topic id must be 12 bytes"))?;
    AppId::new(&topic.application)
        .map_err(|_| ServiceError::InvalidRequest("invalid application id"))?;

    let creator_member = member_at(topic, topic.index_of_message_creator)?;
    if creator_member.role() != MemberRole::Admin {
        return Err(ServiceError::InvalidRequest(
            "the topic creator must be an admin",
        ));
    }
    let creator_info = creator_member
        .info
        .as_ref()
        .ok_or(ServiceError::InvalidRequest(
            "the topic creator must carry creation info",
        ))?;
    if creator_info.user_key != creator.as_slice() {
        return Err(ServiceError::AuthenticationFailed);
    }

    for member in &topic.members {
        MemberRole::try_from(member.role)
            .map_err(|_| ServiceError::InvalidRequest("invalid member role"))?;
        let info = member.info.as_ref().ok_or(ServiceError::InvalidRequest(
            "every member must carry creation info",
        ))?;
        info.verify(&member.signature_key)?;
    }

    verify_signed(topic, &creator_member.signature_key)?;
    Ok(topic_id)
}

/// The invariants of a topic update: author index and role, metadata
/// bound, file reference shape and availability, and the author's
/// signature. `file_available` reports whether a referenced file was
/// previously uploaded; `uploads` are the files carried alongside.
pub fn validate_topic_update(
    update: &TopicUpdate,
    topic: &Topic,
    uploads: &[FileData],
    mut file_available: impl FnMut(&MessageId) -> bool,
) -> Result<(), ServiceError> {
    let author = member_at(topic, update.index_in_member_list)?;
    match author.role() {
        MemberRole::Admin | MemberRole::Participant => {}
        MemberRole::Observer => {
            return Err(ServiceError::InvalidRequest(
                "observers may not post updates",
            ));
        }
    }
    if update.metadata.len() >= MAX_METADATA_LENGTH {
        return Err(ServiceError::InvalidRequest("metadata too large"));
    }

    for file in &update.files {
        let id = MessageId::try_from(file.id.as_slice())
            .map_err(|_| ServiceError::InvalidRequest("file id must be 12 bytes"))?;
        if file.hash.len() != FILE_HASH_LENGTH {
            return Err(ServiceError::InvalidRequest("file hash must be 32 bytes"));
        }
        if file.tag.len() != FILE_TAG_LENGTH {
            return Err(ServiceError::InvalidRequest("file tag must be 16 bytes"));
        }
        if let Some(upload) = uploads.iter().find(|upload| upload.id == file.id) {
            if crypto::sha256(&[&upload.data]) != file.hash.as_slice() {
                return Err(ServiceError::InvalidRequest(
                    "uploaded file does not match its hash",
                ));
            }
        } else if !file_available(&id) {
            return Err(ServiceError::InvalidRequest(
                "referenced file was never uploaded",
            ));
        }
    }

    verify_signed(update, &author.signature_key)
}

fn member_at(topic: &Topic, index: u32) -> Result<&MemberInfo, ServiceError> {
    topic
        .members
        .get(index as usize)
        .ok_or(ServiceError::InvalidRequest("member index out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdvprotos::SignedPayload;

    fn base_user() -> InternalUser {
        InternalUser {
            identity_key: vec![1; 32],
            creation_time: 100,
            name: "alice".into(),
            devices: vec![device(2), device(3)],
            notification_server: String::new(),
            timestamp: 500,
            signature: vec![0; 64],
        }
    }

    fn device(byte: u8) -> Device {
        Device {
            device_key: vec![byte; 32],
            creation_time: 100,
            is_active: true,
            application: "chat".into(),
        }
    }

    #[test]
    fn device_add_must_be_tail_append() {
        let old = base_user();
        let mut new = base_user();
        new.timestamp = 501;
        new.devices.push(device(4));
        assert!(validate_device_added(&old, &new).is_ok());

        // Inserting in the middle is rejected.
        let mut reordered = base_user();
        reordered.timestamp = 501;
        reordered.devices.insert(0, device(4));
        assert!(validate_device_added(&old, &reordered).is_err());
    }

    #[test]
    fn device_add_requires_strictly_newer_timestamp() {
        let old = base_user();
        let mut new = base_user();
        new.devices.push(device(4));
        new.timestamp = old.timestamp;
        assert!(matches!(
            validate_device_added(&old, &new),
            Err(ServiceError::RequestOutdated)
        ));
    }

    #[test]
    fn device_add_rejects_changed_fields() {
        let old = base_user();
        let mut new = base_user();
        new.timestamp = 501;
        new.devices.push(device(4));
        new.name = "mallory".into();
        assert!(matches!(
            validate_device_added(&old, &new),
            Err(ServiceError::InvalidRequest(_))
        ));
    }

    #[test]
    fn device_removal_finds_the_gap() {
        let old = base_user();
        let mut new = base_user();
        new.timestamp = 501;
        new.devices.remove(0);
        let removed = validate_device_removed(&old, &new).unwrap();
        assert_eq!(removed.device_key, vec![2; 32]);

        // Removing one device and altering another is rejected.
        let mut tampered = base_user();
        tampered.timestamp = 501;
        tampered.devices.remove(0);
        tampered.devices[0].application = "mail".into();
        assert!(validate_device_removed(&old, &tampered).is_err());
    }

    #[test]
    fn metadata_bound_is_enforced() {
        let mut update = TopicUpdate {
            index_in_member_list: 0,
            files: Vec::new(),
            metadata: vec![0; MAX_METADATA_LENGTH],
            signature: vec![0; 64],
        };
        let topic = topic_with_one_admin();
        assert!(matches!(
            validate_topic_update(&update, &topic, &[], |_| false),
            Err(ServiceError::InvalidRequest("metadata too large"))
        ));
        update.metadata.truncate(MAX_METADATA_LENGTH - 1);
        // Now fails later, on the (dummy) signature.
        assert!(matches!(
            validate_topic_update(&update, &topic, &[], |_| false),
            Err(ServiceError::InvalidSignature)
        ));
    }

    fn topic_with_one_admin() -> Topic {
        Topic {
            topic_id: vec![9; 12],
            application: "chat".into(),
            creation_time: 100,
            index_of_message_creator: 0,
            members: vec![MemberInfo {
                signature_key: vec![5; 32],
                role: MemberRole::Admin as i32,
                encrypted_message_key: vec![6; 32],
                info: None,
            }],
            timestamp: 100,
            signature: vec![0; 64],
        }
    }

    #[test]
    fn update_author_must_not_be_observer() {
        let mut topic = topic_with_one_admin();
        topic.members[0].role = MemberRole::Observer as i32;
        let update = TopicUpdate {
            index_in_member_list: 0,
            files: Vec::new(),
            metadata: Vec::new(),
            signature: vec![0; 64],
        };
        assert!(validate_topic_update(&update, &topic, &[], |_| false).is_err());
    }

    #[test]
    fn file_hash_is_checked_against_upload() {
        let data = b"encrypted file".to_vec();
        let mut update = TopicUpdate {
            index_in_member_list: 0,
            files: vec![rdvprotos::TopicFile {
                id: vec![1; 12],
                hash: crypto::sha256(&[&data]).to_vec(),
                tag: vec![0; 16],
            }],
            metadata: Vec::new(),
            signature: vec![0; 64],
        };
        let topic = topic_with_one_admin();
        let uploads = vec![FileData {
            id: vec![1; 12],
            data,
        }];
        // Hash matches: validation proceeds to the signature.
        assert!(matches!(
            validate_topic_update(&update, &topic, &uploads, |_| false),
            Err(ServiceError::InvalidSignature)
        ));
        update.files[0].hash = vec![0; 32];
        assert!(matches!(
            validate_topic_update(&update, &topic, &uploads, |_| false),
            Err(ServiceError::InvalidRequest(_))
        ));
    }

    #[test]
    fn self_signed_user_record_verifies() {
        use ed25519_dalek::SigningKey;
        let key = SigningKey::generate(&mut rand::rngs::OsRng);
        let mut user = base_user();
        user.identity_key = key.verifying_key().as_bytes().to_vec();
        user.signature = crypto::sign(&key, &user.signed_bytes()).to_vec();
        verify_self_signed(&user).unwrap();

        user.timestamp += 1;
        assert!(verify_self_signed(&user).is_err());
    }
}
