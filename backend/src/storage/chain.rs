// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Topic chain segments. Updates are indexed 1-based; segment files are
//! named by the 0-based position of their first update and hold at most
//! [`SEGMENT_LENGTH`] updates, which bounds the append-and-rewrite cost
//! while keeping a 1000-update verification window in a single file.

use std::fs;

use prost::Message;
use rdvcommon::{crypto, identifiers::TopicId, ServiceError};

use super::{write_atomic, Storage};
use rdvprotos::{MessageChain, TopicUpdate};

pub const SEGMENT_LENGTH: u32 = 1000;

impl Storage {
    /// Appends `update` as the `new_chain_index`-th update (1-based) and
    /// returns the new chain output `SHA256(prior_output ‖ update.signature)`.
    ///
    /// A fresh segment is started whenever the update's 0-based position is
    /// a multiple of [`SEGMENT_LENGTH`].
    pub fn append_update(
        &self,
        topic: &TopicId,
        update: &TopicUpdate,
        new_chain_index: u32,
        prior_output: &[u8],
    ) -> Result<Vec<u8>, ServiceError> {
        if new_chain_index == 0 {
            return Err(ServiceError::Internal("chain index must be 1-based".into()));
        }
        let position = new_chain_index - 1;
        let segment_base = position - position % SEGMENT_LENGTH;
        let path = self.segment_path(topic, segment_base);

        let mut segment = if position == segment_base {
            MessageChain::default()
        } else {
            MessageChain::decode(fs::read(&path)?.as_slice())?
        };
        if segment.updates.len() as u32 != position - segment_base {
            return Err(ServiceError::Internal(format!(
                "chain segment for topic {topic} out of sync at index {new_chain_index}"
            )));
        }

        segment.updates.push(update.clone());
        let new_output = crypto::sha256(&[prior_output, &update.signature]);
        write_atomic(&path, &segment.encode_to_vec())?;
        Ok(new_output.to_vec())
    }

    /// Reads `count` updates starting at the 1-based index `start`,
    /// crossing segment boundaries as needed. Returns the contiguous slice
    /// that exists.
    pub fn read_updates(
        &self,
        topic: &TopicId,
        start: u32,
        count: u32,
    ) -> Result<Vec<TopicUpdate>, ServiceError> {
        let mut updates = Vec::with_capacity(count as usize);
        if start == 0 || count == 0 {
            return Ok(updates);
        }
        let mut position = start - 1;
        let end = position + count;
        while position < end {
            let segment_base = position - position % SEGMENT_LENGTH;
            let path = self.segment_path(topic, segment_base);
            if !path.exists() {
                break;
            }
            let segment = MessageChain::decode(fs::read(&path)?.as_slice())?;
            let offset = (position - segment_base) as usize;
            let take = ((end - segment_base) as usize).min(segment.updates.len());
            if offset >= take {
                break;
            }
            updates.extend_from_slice(&segment.updates[offset..take]);
            position = segment_base + take as u32;
            if take < SEGMENT_LENGTH as usize {
                // Last (partial) segment reached.
                break;
            }
        }
        Ok(updates)
    }

    fn segment_path(&self, topic: &TopicId, segment_base: u32) -> std::path::PathBuf {
        self.topic_dir(topic).join(segment_base.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(byte: u8) -> TopicUpdate {
        TopicUpdate {
            index_in_member_list: 0,
            files: Vec::new(),
            metadata: vec![byte],
            signature: vec![byte; 64],
        }
    }

    /// Replays the chain rule over `updates` starting from the topic id.
    fn replay(topic: &TopicId, updates: &[TopicUpdate]) -> Vec<u8> {
        let mut output = topic.to_vec();
        for update in updates {
            output = crypto::sha256(&[&output, update.signature.as_slice()]).to_vec();
        }
        output
    }

    #[test]
    fn chain_replay_matches_append_outputs() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = Storage::new(dir.path())?;
        let topic = TopicId::new([4; 12]);
        storage.create_topic_tree(&topic)?;

        let updates: Vec<_> = (0..5).map(update).collect();
        let mut output = topic.to_vec();
        for (i, u) in updates.iter().enumerate() {
            output = storage.append_update(&topic, u, i as u32 + 1, &output)?;
        }

        let read_back = storage.read_updates(&topic, 1, 5)?;
        assert_eq!(read_back, updates);
        assert_eq!(replay(&topic, &read_back), output);
        Ok(())
    }

    #[test]
    fn reads_cross_segment_boundaries() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = Storage::new(dir.path())?;
        let topic = TopicId::new([5; 12]);
        storage.create_topic_tree(&topic)?;

        let total = SEGMENT_LENGTH + 10;
        let mut output = topic.to_vec();
        for i in 1..=total {
            output = storage.append_update(&topic, &update((i % 251) as u8), i, &output)?;
        }
        assert!(dir.path().join(format!("topics/{topic}/0")).exists());
        assert!(dir
            .path()
            .join(format!("topics/{topic}/{SEGMENT_LENGTH}"))
            .exists());

        let across = storage.read_updates(&topic, SEGMENT_LENGTH - 1, 4)?;
        assert_eq!(across.len(), 4);
        assert_eq!(across[0], update(((SEGMENT_LENGTH - 1) % 251) as u8));
        assert_eq!(across[3], update(((SEGMENT_LENGTH + 2) % 251) as u8));

        // A range past the end returns only what exists.
        let tail = storage.read_updates(&topic, total - 1, 10)?;
        assert_eq!(tail.len(), 2);
        Ok(())
    }

    #[test]
    fn append_detects_out_of_sync_segment() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = Storage::new(dir.path())?;
        let topic = TopicId::new([6; 12]);
        storage.create_topic_tree(&topic)?;

        let output = storage.append_update(&topic, &update(1), 1, topic.as_slice())?;
        // Skipping index 2 must fail.
        assert!(storage.append_update(&topic, &update(2), 3, &output).is_err());
        Ok(())
    }
}
