// Copyright 2023 ICON Foundation
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! RLP transaction results and event logs, plus the receipt stream the
//! receiver hands to the message sender.

use rlp::{DecoderError, Rlp, RlpStream};

use crate::address::BTPAddress;
use crate::hash::Hash;

/// An event log as proven out of the event-log trie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    /// 21-byte binary address of the emitting contract.
    pub addr: Vec<u8>,
    /// Indexed fields; `indexed[0]` is the event signature.
    pub indexed: Vec<Vec<u8>>,
    /// Non-indexed fields.
    pub data: Vec<Vec<u8>>,
}

impl rlp::Encodable for EventLog {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.addr);
        s.append_list::<Vec<u8>, _>(&self.indexed);
        s.append_list::<Vec<u8>, _>(&self.data);
    }
}

impl rlp::Decodable for EventLog {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(Self {
            addr: rlp.val_at(0)?,
            indexed: rlp.list_at(1)?,
            data: rlp.list_at(2)?,
        })
    }
}

/// A transaction execution result: the leaf value of the receipt trie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxResult {
    /// 0 for success, a failure code otherwise.
    pub status: u64,
    /// 21-byte binary address of the receiver.
    pub to: Vec<u8>,
    /// Big-endian steps consumed by the block so far.
    pub cumulative_step_used: Vec<u8>,
    /// Big-endian steps consumed by this transaction.
    pub step_used: Vec<u8>,
    /// Big-endian step price.
    pub step_price: Vec<u8>,
    /// Bloom filter over the emitted event logs.
    pub logs_bloom: Vec<u8>,
    /// Event logs embedded inline, empty when only the hash is carried.
    pub event_logs: Vec<EventLog>,
    /// Address of a deployed contract, empty otherwise.
    pub score_address: Vec<u8>,
    /// Root of the event-log trie for this receipt.
    pub event_logs_hash: Hash,
}

impl TxResult {
    /// Decodes from the receipt-trie leaf value.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecoderError> {
        rlp::decode(bytes)
    }
}

impl rlp::Encodable for TxResult {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(9);
        s.append(&self.status);
        s.append(&self.to);
        s.append(&self.cumulative_step_used);
        s.append(&self.step_used);
        s.append(&self.step_price);
        s.append(&self.logs_bloom);
        s.append_list::<EventLog, _>(&self.event_logs);
        s.append(&self.score_address);
        s.append(&self.event_logs_hash);
    }
}

impl rlp::Decodable for TxResult {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(Self {
            status: rlp.val_at(0)?,
            to: rlp.val_at(1)?,
            cumulative_step_used: rlp.val_at(2)?,
            step_used: rlp.val_at(3)?,
            step_price: rlp.val_at(4)?,
            logs_bloom: rlp.val_at(5)?,
            event_logs: rlp.list_at(6)?,
            score_address: rlp.val_at(7)?,
            event_logs_hash: rlp.val_at(8)?,
        })
    }
}

/// A BTP message event delivered to the sender side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Destination BTP address the message is routed to.
    pub next: BTPAddress,
    /// Per-destination monotonically increasing counter.
    pub sequence: u64,
    /// Opaque message payload.
    pub message: Vec<u8>,
}

/// All delivered events of one receipt, after filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Receipt index inside the block.
    pub index: u64,
    /// Height of the block.
    pub height: u64,
    /// Filtered events in on-chain order.
    pub events: Vec<Event>,
}

/// One unit of delivery to the message sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Receipts in strictly ascending `(height, index)` order.
    pub receipts: Vec<Receipt>,
}

/// Where a subscription starts: the caller's persisted checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// First height to process; clamped to at least 1.
    pub height: u64,
    /// Last delivered sequence; the first delivered event carries `seq + 1`.
    pub seq: u64,
}
