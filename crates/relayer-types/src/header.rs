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

//! RLP block headers.
//!
//! The wire bytes are preserved verbatim on decode: the block hash is
//! SHA3-256 over exactly the bytes the node served, so re-encoding must
//! never be on the hashing path.

use rlp::{DecoderError, Rlp, RlpStream};

use crate::hash::Hash;

/// A source-chain block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Header format version.
    pub version: u64,
    /// Height of this block.
    pub height: u64,
    /// Proposal timestamp in microseconds.
    pub timestamp: u64,
    /// Address bytes of the proposer.
    pub proposer: Vec<u8>,
    /// Hash of the previous block.
    pub prev_hash: Vec<u8>,
    /// Hash of the commit-vote list certifying the previous block.
    pub votes_hash: Vec<u8>,
    /// Hash identifying the validator set for the next block.
    pub next_validators_hash: Hash,
    /// Hash over the patch transactions, empty when there are none.
    pub patch_tx_hash: Vec<u8>,
    /// Hash over the normal transactions, empty when there are none.
    pub normal_tx_hash: Vec<u8>,
    /// Bloom filter over the block's event logs.
    pub logs_bloom: Vec<u8>,
    /// RLP-encoded [`BlockHeaderResult`] of the previous block's execution.
    pub result: Vec<u8>,
    serialized: Vec<u8>,
}

impl BlockHeader {
    /// Decodes a header, keeping `bytes` for re-hashing.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecoderError> {
        let rlp = Rlp::new(bytes);
        let header = Self {
            version: rlp.val_at(0)?,
            height: rlp.val_at(1)?,
            timestamp: rlp.val_at(2)?,
            proposer: rlp.val_at(3)?,
            prev_hash: rlp.val_at(4)?,
            votes_hash: rlp.val_at(5)?,
            next_validators_hash: rlp.val_at(6)?,
            patch_tx_hash: rlp.val_at(7)?,
            normal_tx_hash: rlp.val_at(8)?,
            logs_bloom: rlp.val_at(9)?,
            result: rlp.val_at(10)?,
            serialized: bytes.to_vec(),
        };
        Ok(header)
    }

    /// Encodes the header fields.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(11);
        s.append(&self.version);
        s.append(&self.height);
        s.append(&self.timestamp);
        s.append(&self.proposer);
        s.append(&self.prev_hash);
        s.append(&self.votes_hash);
        s.append(&self.next_validators_hash);
        s.append(&self.patch_tx_hash);
        s.append(&self.normal_tx_hash);
        s.append(&self.logs_bloom);
        s.append(&self.result);
        s.out().to_vec()
    }

    /// The exact bytes this header was decoded from, or a fresh encoding
    /// for headers built in memory.
    pub fn serialized(&self) -> Vec<u8> {
        if self.serialized.is_empty() {
            self.to_bytes()
        } else {
            self.serialized.clone()
        }
    }

    /// The block hash: SHA3-256 over the wire bytes.
    pub fn hash(&self) -> Hash {
        Hash::of(&self.serialized())
    }

    /// Decodes the embedded execution result.
    pub fn header_result(&self) -> Result<BlockHeaderResult, DecoderError> {
        rlp::decode(&self.result)
    }

    /// Builds a header from parts; used when fabricating blocks in tests
    /// and by the encode path.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: u64,
        height: u64,
        timestamp: u64,
        proposer: Vec<u8>,
        prev_hash: Vec<u8>,
        votes_hash: Vec<u8>,
        next_validators_hash: Hash,
        patch_tx_hash: Vec<u8>,
        normal_tx_hash: Vec<u8>,
        logs_bloom: Vec<u8>,
        result: Vec<u8>,
    ) -> Self {
        Self {
            version,
            height,
            timestamp,
            proposer,
            prev_hash,
            votes_hash,
            next_validators_hash,
            patch_tx_hash,
            normal_tx_hash,
            logs_bloom,
            result,
            serialized: Vec::new(),
        }
    }
}

/// Execution result carried inside a block header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockHeaderResult {
    /// World-state root after execution.
    pub state_hash: Vec<u8>,
    /// Receipt-trie root for patch transactions.
    pub patch_receipt_hash: Vec<u8>,
    /// Receipt-trie root for normal transactions.
    pub receipt_hash: Hash,
    /// Chain-specific extension payload, empty when unused.
    pub extension_data: Vec<u8>,
}

impl rlp::Encodable for BlockHeaderResult {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.state_hash);
        s.append(&self.patch_receipt_hash);
        s.append(&self.receipt_hash);
        s.append(&self.extension_data);
    }
}

impl rlp::Decodable for BlockHeaderResult {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(Self {
            state_hash: rlp.val_at(0)?,
            patch_receipt_hash: rlp.val_at(1)?,
            receipt_hash: rlp.val_at(2)?,
            extension_data: rlp.val_at(3)?,
        })
    }
}
