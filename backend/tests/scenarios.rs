// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end scenarios against a service instance backed by a temporary
//! storage tree.

use anyhow::Result;
use ed25519_dalek::SigningKey;
use rand::{rngs::OsRng, RngCore};
use rdvbackend::{push::NullPushProvider, storage::Storage, Rendezvous};
use rdvcommon::{
    crypto,
    identifiers::{AuthToken, DeviceKey, TopicId, UserKey},
    time::Timestamp,
    ServiceError,
};
use rdvprotos::{
    CreationInfo, Device, DevicePrekey, InternalUser, MemberInfo, MemberRole, RegistrationBundle,
    SignedPayload, Topic, TopicFile, TopicKey, TopicUpdate, TopicUpdateUpload,
};

const APP: &str = "chat";

fn service(dir: &std::path::Path) -> Rendezvous<NullPushProvider> {
    Rendezvous::new(Storage::new(dir).unwrap(), NullPushProvider, true).unwrap()
}

fn random_bytes(count: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; count];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn now() -> u64 {
    Timestamp::now().seconds()
}

struct TestUser {
    identity: SigningKey,
    device: SigningKey,
    user_key: UserKey,
    device_key: DeviceKey,
    token: AuthToken,
}

fn device_record(device: &SigningKey, creation_time: u64) -> Device {
    Device {
        device_key: device.verifying_key().as_bytes().to_vec(),
        creation_time,
        is_active: true,
        application: APP.into(),
    }
}

fn signed_user_record(
    identity: &SigningKey,
    name: &str,
    creation_time: u64,
    devices: Vec<Device>,
    timestamp: u64,
) -> InternalUser {
    let mut user = InternalUser {
        identity_key: identity.verifying_key().as_bytes().to_vec(),
        creation_time,
        name: name.into(),
        devices,
        notification_server: String::new(),
        timestamp,
        signature: Vec::new(),
    };
    user.signature = crypto::sign(identity, &user.signed_bytes()).to_vec();
    user
}

fn signed_prekey(device: &SigningKey) -> DevicePrekey {
    let mut prekey = DevicePrekey {
        pre_key: random_bytes(32),
        signature: Vec::new(),
    };
    prekey.signature = crypto::sign(device, &prekey.signed_bytes()).to_vec();
    prekey
}

fn signed_topic_key(identity: &SigningKey) -> TopicKey {
    let signature_key = SigningKey::generate(&mut OsRng)
        .verifying_key()
        .as_bytes()
        .to_vec();
    let encryption_key = random_bytes(32);
    let payload = [signature_key.as_slice(), encryption_key.as_slice()].concat();
    TopicKey {
        signature: crypto::sign(identity, &payload).to_vec(),
        signature_key,
        encryption_key,
    }
}

fn registration_bundle(
    identity: &SigningKey,
    device: &SigningKey,
    name: &str,
    pin: u32,
    prekeys: usize,
    topic_keys: usize,
) -> RegistrationBundle {
    let timestamp = now();
    RegistrationBundle {
        info: Some(signed_user_record(
            identity,
            name,
            timestamp,
            vec![device_record(device, timestamp)],
            timestamp,
        )),
        pin,
        pre_keys: (0..prekeys).map(|_| signed_prekey(device)).collect(),
        topic_keys: (0..topic_keys).map(|_| signed_topic_key(identity)).collect(),
    }
}

async fn register(
    service: &Rendezvous<NullPushProvider>,
    name: &str,
    prekeys: usize,
) -> Result<TestUser> {
    let admin = service.admin_token()?;
    let allowed = service.allow_user(&admin, name).await?;
    let identity = SigningKey::generate(&mut OsRng);
    let device = SigningKey::generate(&mut OsRng);
    let token = service
        .register_user(registration_bundle(
            &identity,
            &device,
            name,
            allowed.pin,
            prekeys,
            1,
        ))
        .await?;
    Ok(TestUser {
        user_key: UserKey::try_from(identity.verifying_key().as_bytes().as_slice()).unwrap(),
        device_key: DeviceKey::try_from(device.verifying_key().as_bytes().as_slice()).unwrap(),
        identity,
        device,
        token,
    })
}

/// Builds a signed topic record over the given members. Returns the record
/// and the per-member topic signing keys, in member order.
fn build_topic(
    members: &[(&TestUser, MemberRole)],
    creator_index: u32,
) -> (Topic, Vec<SigningKey>) {
    let signing_keys: Vec<SigningKey> = members
        .iter()
        .map(|_| SigningKey::generate(&mut OsRng))
        .collect();
    let member_infos = members
        .iter()
        .zip(&signing_keys)
        .map(|((user, role), signing)| {
            let signature_key = signing.verifying_key().as_bytes().to_vec();
            let encryption_key = random_bytes(32);
            let payload = [signature_key.as_slice(), encryption_key.as_slice()].concat();
            MemberInfo {
                signature_key,
                role: *role as i32,
                encrypted_message_key: random_bytes(32),
                info: Some(CreationInfo {
                    user_key: user.identity.verifying_key().as_bytes().to_vec(),
                    signature: crypto::sign(&user.identity, &payload).to_vec(),
                    encryption_key,
                }),
            }
        })
        .collect();

    let timestamp = now();
    let mut topic = Topic {
        topic_id: random_bytes(12),
        application: APP.into(),
        creation_time: timestamp,
        index_of_message_creator: creator_index,
        members: member_infos,
        timestamp,
        signature: Vec::new(),
    };
    topic.signature = crypto::sign(
        &signing_keys[creator_index as usize],
        &topic.signed_bytes(),
    )
    .to_vec();
    (topic, signing_keys)
}

fn signed_update(
    index: u32,
    files: Vec<TopicFile>,
    metadata: Vec<u8>,
    signing: &SigningKey,
) -> TopicUpdate {
    let mut update = TopicUpdate {
        index_in_member_list: index,
        files,
        metadata,
        signature: Vec::new(),
    };
    update.signature = crypto::sign(signing, &update.signed_bytes()).to_vec();
    update
}

/// Client-side replay of the chain rule.
fn replay_chain(topic_id: &[u8], updates: &[TopicUpdate]) -> Vec<u8> {
    let mut output = topic_id.to_vec();
    for update in updates {
        output = crypto::sha256(&[&output, update.signature.as_slice()]).to_vec();
    }
    output
}

#[tokio::test]
async fn happy_path_registration() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service(dir.path());
    let admin = service.admin_token()?;

    let allowed = service.allow_user(&admin, "alice").await?;
    assert_eq!(allowed.name, "alice");
    assert_eq!(allowed.tries_remaining, 3);
    assert!(allowed.pin < 100_000);

    let identity = SigningKey::generate(&mut OsRng);
    let device = SigningKey::generate(&mut OsRng);
    let token = service
        .register_user(registration_bundle(
            &identity,
            &device,
            "alice",
            allowed.pin,
            2,
            1,
        ))
        .await?;

    let user_key = UserKey::try_from(identity.verifying_key().as_bytes().as_slice())?;
    let device_key = DeviceKey::try_from(device.verifying_key().as_bytes().as_slice())?;

    // The user record is in place and the device token works.
    let info = service.get_user_info(&user_key, &device_key, &token).await?;
    assert_eq!(info.name, "alice");
    assert_eq!(info.devices.len(), 1);

    // The allowed-user entry was consumed: the same pin no longer admits.
    let err = service
        .register_user(registration_bundle(
            &SigningKey::generate(&mut OsRng),
            &SigningKey::generate(&mut OsRng),
            "alice",
            allowed.pin,
            0,
            0,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AuthenticationFailed));

    // The mailbox tracks the uploaded key counts.
    let download = service
        .get_messages_for_device(&user_key, &device_key, &token)
        .await?;
    assert_eq!(download.remaining_pre_keys, 2);
    assert_eq!(download.remaining_topic_keys, 1);
    Ok(())
}

#[tokio::test]
async fn wrong_pin_lockout() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service(dir.path());
    let admin = service.admin_token()?;
    let allowed = service.allow_user(&admin, "bob").await?;
    let wrong_pin = (allowed.pin + 1) % 100_000;

    for _ in 0..3 {
        let err = service
            .register_user(registration_bundle(
                &SigningKey::generate(&mut OsRng),
                &SigningKey::generate(&mut OsRng),
                "bob",
                wrong_pin,
                0,
                0,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AuthenticationFailed));
    }

    // Locked out: even the correct pin fails until the admin re-adds.
    let err = service
        .register_user(registration_bundle(
            &SigningKey::generate(&mut OsRng),
            &SigningKey::generate(&mut OsRng),
            "bob",
            allowed.pin,
            0,
            0,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AuthenticationFailed));
    Ok(())
}

#[tokio::test]
async fn topic_create_and_post() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service(dir.path());
    let alice = register(&service, "alice", 2).await?;
    let bob = register(&service, "bob", 2).await?;

    let (topic, signing_keys) = build_topic(
        &[(&alice, MemberRole::Admin), (&bob, MemberRole::Participant)],
        0,
    );
    let topic_id = TopicId::try_from(topic.topic_id.as_slice())?;
    service
        .create_topic(&alice.user_key, &alice.device_key, &alice.token, topic.clone())
        .await?;

    // Bob's device received the creation record.
    let download = service
        .get_messages_for_device(&bob.user_key, &bob.device_key, &bob.token)
        .await?;
    assert_eq!(download.topic_updates.len(), 1);
    assert_eq!(download.topic_updates[0].topic_id, topic.topic_id);

    // Alice posts an update carrying one file.
    let file_data = random_bytes(256);
    let file = TopicFile {
        id: random_bytes(12),
        hash: crypto::sha256(&[&file_data]).to_vec(),
        tag: random_bytes(16),
    };
    let update = signed_update(0, vec![file.clone()], random_bytes(40), &signing_keys[0]);
    let chain = service
        .add_message(TopicUpdateUpload {
            device_key: alice.device_key.to_vec(),
            auth_token: alice.token.to_vec(),
            topic_id: topic.topic_id.clone(),
            update: Some(update.clone()),
            files: vec![rdvprotos::FileData {
                id: file.id.clone(),
                data: file_data.clone(),
            }],
        })
        .await?;

    assert_eq!(chain.chain_index, 1);
    assert_eq!(
        chain.output,
        crypto::sha256(&[&topic.topic_id, update.signature.as_slice()]).to_vec()
    );

    // Bob's mailbox gained the committed message and can fetch the file.
    let download = service
        .get_messages_for_device(&bob.user_key, &bob.device_key, &bob.token)
        .await?;
    assert_eq!(download.messages.len(), 1);
    let message = &download.messages[0];
    assert_eq!(message.topic_id, topic.topic_id);
    assert_eq!(message.chain.as_ref().unwrap().chain_index, 1);
    assert_eq!(message.chain.as_ref().unwrap().output, chain.output);

    let fetched = service
        .get_file(
            &bob.user_key,
            &bob.device_key,
            &bob.token,
            &topic_id,
            &rdvcommon::identifiers::MessageId::try_from(file.id.as_slice())?,
        )
        .await?;
    assert_eq!(fetched, file_data);
    Ok(())
}

#[tokio::test]
async fn chain_replay_matches_server_head() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service(dir.path());
    let alice = register(&service, "alice", 0).await?;
    let bob = register(&service, "bob", 0).await?;

    let (topic, signing_keys) = build_topic(
        &[(&alice, MemberRole::Admin), (&bob, MemberRole::Participant)],
        0,
    );
    let topic_id = TopicId::try_from(topic.topic_id.as_slice())?;
    service
        .create_topic(&alice.user_key, &alice.device_key, &alice.token, topic.clone())
        .await?;

    let mut head = None;
    for i in 0..3u8 {
        let update = signed_update(0, Vec::new(), vec![i], &signing_keys[0]);
        head = Some(
            service
                .add_message(TopicUpdateUpload {
                    device_key: alice.device_key.to_vec(),
                    auth_token: alice.token.to_vec(),
                    topic_id: topic.topic_id.clone(),
                    update: Some(update),
                    files: Vec::new(),
                })
                .await?,
        );
    }
    let head = head.unwrap();
    assert_eq!(head.chain_index, 3);

    // The client replays the range and matches the server's head.
    let range = service
        .get_messages_in_range(&bob.user_key, &bob.device_key, &bob.token, &topic_id, 1, 10)
        .await?;
    assert_eq!(range.updates.len(), 3);
    assert_eq!(replay_chain(&topic.topic_id, &range.updates), head.output);

    // Any omission or reordering breaks the replay.
    let mut tampered = range.updates.clone();
    tampered.swap(0, 1);
    assert_ne!(replay_chain(&topic.topic_id, &tampered), head.output);
    assert_ne!(
        replay_chain(&topic.topic_id, &range.updates[1..]),
        head.output
    );
    Ok(())
}

#[tokio::test]
async fn device_add_preserves_other_fields() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service(dir.path());
    let alice = register(&service, "alice", 0).await?;

    let old = service
        .get_user_info(&alice.user_key, &alice.device_key, &alice.token)
        .await?;
    let second_device = SigningKey::generate(&mut OsRng);
    let mut devices = old.devices.clone();
    devices.push(device_record(&second_device, now()));
    let new_record = signed_user_record(
        &alice.identity,
        "alice",
        old.creation_time,
        devices.clone(),
        old.timestamp + 1,
    );
    let second_token = service.register_device(new_record).await?;

    // The new device has an empty mailbox of its own.
    let second_key = DeviceKey::try_from(second_device.verifying_key().as_bytes().as_slice())?;
    let download = service
        .get_messages_for_device(&alice.user_key, &second_key, &second_token)
        .await?;
    assert!(download.messages.is_empty());
    assert_eq!(download.remaining_pre_keys, 0);

    // The same device list with an altered name is rejected.
    let renamed = signed_user_record(
        &alice.identity,
        "mallory",
        old.creation_time,
        devices,
        old.timestamp + 2,
    );
    let err = service.register_device(renamed).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));
    Ok(())
}

#[tokio::test]
async fn prekey_depletion() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service(dir.path());
    let alice = register(&service, "alice", 3).await?;

    // Add a second device with a pool of five prekeys.
    let old = service
        .get_user_info(&alice.user_key, &alice.device_key, &alice.token)
        .await?;
    let second_device = SigningKey::generate(&mut OsRng);
    let mut devices = old.devices.clone();
    devices.push(device_record(&second_device, now()));
    let second_token = service
        .register_device(signed_user_record(
            &alice.identity,
            "alice",
            old.creation_time,
            devices,
            old.timestamp + 1,
        ))
        .await?;
    let second_key = DeviceKey::try_from(second_device.verifying_key().as_bytes().as_slice())?;
    service
        .add_pre_keys(rdvprotos::DevicePrekeyUploadRequest {
            user_key: alice.user_key.to_vec(),
            device_key: second_key.to_vec(),
            auth_token: second_token.to_vec(),
            prekeys: (0..5).map(|_| signed_prekey(&second_device)).collect(),
        })
        .await?;

    // Pools are (3, 5): the short pool bounds the bundle at 3 per device.
    let bundle = service
        .get_pre_keys(&alice.user_key, &alice.device_key, &alice.token, 5)
        .await?;
    assert_eq!(bundle.devices.len(), 2);
    assert!(bundle.devices.iter().all(|d| d.prekeys.len() == 3));

    // A second call finds the first pool empty.
    let bundle = service
        .get_pre_keys(&alice.user_key, &alice.device_key, &alice.token, 5)
        .await?;
    assert!(bundle.devices.iter().all(|d| d.prekeys.is_empty()));

    // The counters followed the consumption.
    let download = service
        .get_messages_for_device(&alice.user_key, &alice.device_key, &alice.token)
        .await?;
    assert_eq!(download.remaining_pre_keys, 0);
    let download = service
        .get_messages_for_device(&alice.user_key, &second_key, &second_token)
        .await?;
    assert_eq!(download.remaining_pre_keys, 2);
    Ok(())
}

#[tokio::test]
async fn stale_registration_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service(dir.path());
    let admin = service.admin_token()?;
    let allowed = service.allow_user(&admin, "carol").await?;

    let identity = SigningKey::generate(&mut OsRng);
    let device = SigningKey::generate(&mut OsRng);
    let timestamp = now() - 120;
    let bundle = RegistrationBundle {
        info: Some(signed_user_record(
            &identity,
            "carol",
            timestamp,
            vec![device_record(&device, timestamp)],
            timestamp,
        )),
        pin: allowed.pin,
        pre_keys: Vec::new(),
        topic_keys: Vec::new(),
    };
    let err = service.register_user(bundle).await.unwrap_err();
    assert!(matches!(err, ServiceError::RequestOutdated));
    Ok(())
}

#[tokio::test]
async fn delivery_receipts_reach_other_members() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service(dir.path());
    let alice = register(&service, "alice", 0).await?;
    let bob = register(&service, "bob", 0).await?;

    let (topic, signing_keys) = build_topic(
        &[(&alice, MemberRole::Admin), (&bob, MemberRole::Participant)],
        0,
    );
    service
        .create_topic(&alice.user_key, &alice.device_key, &alice.token, topic.clone())
        .await?;
    let update = signed_update(0, Vec::new(), Vec::new(), &signing_keys[0]);
    service
        .add_message(TopicUpdateUpload {
            device_key: alice.device_key.to_vec(),
            auth_token: alice.token.to_vec(),
            topic_id: topic.topic_id.clone(),
            update: Some(update),
            files: Vec::new(),
        })
        .await?;

    // Bob drains the message; on Alice's next poll she sees his receipt.
    service
        .get_messages_for_device(&bob.user_key, &bob.device_key, &bob.token)
        .await?;
    let download = service
        .get_messages_for_device(&alice.user_key, &alice.device_key, &alice.token)
        .await?;
    let receipt = download
        .receipts
        .iter()
        .find(|r| r.sender == bob.user_key.as_slice())
        .expect("receipt from bob");
    assert_eq!(receipt.topic_id, topic.topic_id);
    assert_eq!(receipt.chain_index, 1);
    Ok(())
}

#[tokio::test]
async fn registry_survives_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let alice = {
        let service = service(dir.path());
        register(&service, "alice", 1).await?
    };

    // A new service instance over the same storage restores the registry.
    let service = service(dir.path());
    let info = service
        .get_user_info(&alice.user_key, &alice.device_key, &alice.token)
        .await?;
    assert_eq!(info.name, "alice");
    let download = service
        .get_messages_for_device(&alice.user_key, &alice.device_key, &alice.token)
        .await?;
    assert_eq!(download.remaining_pre_keys, 1);
    Ok(())
}
