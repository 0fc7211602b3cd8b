// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-device prekey pools. Each pool is one `DevicePreKeyList` blob;
//! consumption takes from the front and rewrites (or deletes) the blob.

use std::fs;

use prost::Message;
use rdvcommon::{
    identifiers::{DeviceKey, UserKey},
    ServiceError,
};

use super::{remove_if_present, write_atomic, Storage};
use rdvprotos::{DevicePreKeyBundle, DevicePreKeyList, DevicePrekey};

impl Storage {
    /// Appends fresh prekeys to the device's pool and returns the new pool
    /// size.
    pub fn store_pre_keys(
        &self,
        user: &UserKey,
        device: &DeviceKey,
        new_keys: &[DevicePrekey],
    ) -> Result<usize, ServiceError> {
        let path = self.prekey_path(user, device);
        let mut list = self.load_pre_keys(user, device)?;
        list.prekeys.extend_from_slice(new_keys);
        write_atomic(&path, &list.encode_to_vec())?;
        Ok(list.prekeys.len())
    }

    /// Takes up to `count` prekeys from each listed device.
    ///
    /// The number taken is `min(count, min over devices of pool size)`, so
    /// either every device contributes the same number of keys or none
    /// does. Pools are rewritten without the consumed keys; an emptied pool
    /// blob is deleted.
    pub fn consume_pre_keys(
        &self,
        user: &UserKey,
        devices: &[DeviceKey],
        count: usize,
    ) -> Result<DevicePreKeyBundle, ServiceError> {
        let mut pools = Vec::with_capacity(devices.len());
        for device in devices {
            pools.push(self.load_pre_keys(user, device)?);
        }
        let available = pools
            .iter()
            .map(|pool| pool.prekeys.len())
            .min()
            .unwrap_or(0)
            .min(count);

        let mut bundle = DevicePreKeyBundle {
            user_key: user.to_vec(),
            devices: Vec::with_capacity(devices.len()),
        };
        for (device, mut pool) in devices.iter().zip(pools) {
            let taken: Vec<DevicePrekey> = pool.prekeys.drain(..available).collect();
            let path = self.prekey_path(user, device);
            if pool.prekeys.is_empty() {
                remove_if_present(&path)?;
            } else {
                write_atomic(&path, &pool.encode_to_vec())?;
            }
            bundle.devices.push(DevicePreKeyList {
                device_key: device.to_vec(),
                remaining_keys: pool.prekeys.len() as u32,
                prekeys: taken,
            });
        }
        Ok(bundle)
    }

    pub fn delete_device_pre_keys(
        &self,
        user: &UserKey,
        device: &DeviceKey,
    ) -> Result<(), ServiceError> {
        remove_if_present(&self.prekey_path(user, device))
    }

    fn load_pre_keys(
        &self,
        user: &UserKey,
        device: &DeviceKey,
    ) -> Result<DevicePreKeyList, ServiceError> {
        let path = self.prekey_path(user, device);
        if !path.exists() {
            return Ok(DevicePreKeyList::default());
        }
        Ok(DevicePreKeyList::decode(fs::read(path)?.as_slice())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prekey(byte: u8) -> DevicePrekey {
        DevicePrekey {
            pre_key: vec![byte; 32],
            signature: vec![byte; 64],
        }
    }

    fn ids() -> (UserKey, DeviceKey, DeviceKey) {
        (
            UserKey::new([1; 32]),
            DeviceKey::new([2; 32]),
            DeviceKey::new([3; 32]),
        )
    }

    #[test]
    fn consume_applies_min_rule_across_devices() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = Storage::new(dir.path())?;
        let (user, d1, d2) = ids();
        storage.create_user_tree(&user)?;

        storage.store_pre_keys(&user, &d1, &[prekey(1), prekey(2), prekey(3)])?;
        storage.store_pre_keys(&user, &d2, &[prekey(4), prekey(5), prekey(6), prekey(7), prekey(8)])?;

        let bundle = storage.consume_pre_keys(&user, &[d1, d2], 5)?;
        assert_eq!(bundle.devices.len(), 2);
        assert_eq!(bundle.devices[0].prekeys.len(), 3);
        assert_eq!(bundle.devices[1].prekeys.len(), 3);
        assert_eq!(bundle.devices[0].remaining_keys, 0);
        assert_eq!(bundle.devices[1].remaining_keys, 2);

        // The first device's pool is exhausted, so nothing more is handed out.
        let bundle = storage.consume_pre_keys(&user, &[d1, d2], 5)?;
        assert_eq!(bundle.devices[0].prekeys.len(), 0);
        assert_eq!(bundle.devices[1].prekeys.len(), 0);
        assert_eq!(bundle.devices[1].remaining_keys, 2);
        Ok(())
    }

    #[test]
    fn consumed_keys_are_never_returned_twice() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = Storage::new(dir.path())?;
        let (user, d1, _) = ids();
        storage.create_user_tree(&user)?;
        storage.store_pre_keys(&user, &d1, &[prekey(1), prekey(2)])?;

        let first = storage.consume_pre_keys(&user, &[d1], 1)?;
        let second = storage.consume_pre_keys(&user, &[d1], 1)?;
        assert_ne!(
            first.devices[0].prekeys[0].pre_key,
            second.devices[0].prekeys[0].pre_key
        );
        Ok(())
    }
}
