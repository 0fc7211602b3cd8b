// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-device download queues. A mailbox accumulates topic records,
//! topic-key messages, committed messages and delivery receipts until the
//! device polls; draining returns a consistent cut and leaves the key
//! counters in place.

use rdvcommon::identifiers::{TopicId, UserKey};
use rdvprotos::{DeviceDownload, Message, Receipt, Topic, TopicKeyMessage};

#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    download: DeviceDownload,
}

impl Mailbox {
    pub fn with_counters(remaining_pre_keys: u32, remaining_topic_keys: u32) -> Self {
        Self {
            download: DeviceDownload {
                remaining_pre_keys,
                remaining_topic_keys,
                ..Default::default()
            },
        }
    }

    pub fn push_topic(&mut self, topic: Topic) {
        self.download.topic_updates.push(topic);
    }

    pub fn push_key_messages(&mut self, messages: &[TopicKeyMessage]) {
        self.download.topic_key_messages.extend_from_slice(messages);
    }

    pub fn push_message(&mut self, message: Message) {
        self.download.messages.push(message);
    }

    /// Raises the receipt for `(sender, topic)` to `chain_index`. Returns
    /// whether the stored value advanced.
    pub fn advance_receipt(&mut self, sender: &UserKey, topic: &TopicId, chain_index: u32) -> bool {
        let entry = self
            .download
            .receipts
            .iter_mut()
            .find(|r| r.sender == sender.as_slice() && r.topic_id == topic.as_slice());
        match entry {
            Some(receipt) if receipt.chain_index >= chain_index => false,
            Some(receipt) => {
                receipt.chain_index = chain_index;
                true
            }
            None => {
                self.download.receipts.push(Receipt {
                    sender: sender.to_vec(),
                    topic_id: topic.to_vec(),
                    chain_index,
                });
                true
            }
        }
    }

    pub fn set_remaining_pre_keys(&mut self, count: u32) {
        self.download.remaining_pre_keys = count;
    }

    pub fn set_remaining_topic_keys(&mut self, count: u32) {
        self.download.remaining_topic_keys = count;
    }

    /// Empties the mailbox, keeping the key counters, and returns the
    /// drained content.
    pub fn drain(&mut self) -> DeviceDownload {
        let empty = DeviceDownload {
            remaining_pre_keys: self.download.remaining_pre_keys,
            remaining_topic_keys: self.download.remaining_topic_keys,
            ..Default::default()
        };
        std::mem::replace(&mut self.download, empty)
    }

    pub fn download(&self) -> &DeviceDownload {
        &self.download
    }

    pub fn into_download(self) -> DeviceDownload {
        self.download
    }

    pub fn from_download(download: DeviceDownload) -> Self {
        Self { download }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_counters() {
        let mut mailbox = Mailbox::with_counters(4, 7);
        mailbox.push_message(Message::default());
        let drained = mailbox.drain();
        assert_eq!(drained.messages.len(), 1);
        assert_eq!(drained.remaining_pre_keys, 4);
        assert_eq!(mailbox.download().messages.len(), 0);
        assert_eq!(mailbox.download().remaining_pre_keys, 4);
        assert_eq!(mailbox.download().remaining_topic_keys, 7);
    }

    #[test]
    fn receipts_only_advance() {
        let mut mailbox = Mailbox::default();
        let sender = UserKey::new([1; 32]);
        let topic = TopicId::new([2; 12]);
        assert!(mailbox.advance_receipt(&sender, &topic, 3));
        assert!(!mailbox.advance_receipt(&sender, &topic, 2));
        assert!(!mailbox.advance_receipt(&sender, &topic, 3));
        assert!(mailbox.advance_receipt(&sender, &topic, 5));
        assert_eq!(mailbox.download().receipts.len(), 1);
        assert_eq!(mailbox.download().receipts[0].chain_index, 5);
    }
}
