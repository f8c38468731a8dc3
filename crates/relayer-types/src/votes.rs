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

//! Commit-vote lists and the canonical validator-set encoding.

use rlp::{DecoderError, Rlp, RlpStream};

use crate::hash::{sha3_256, Hash};

/// Vote type byte for a precommit, the only kind that certifies a block.
pub const VOTE_TYPE_PRECOMMIT: u8 = 1;

/// A validator address: the 20-byte body of an account address.
pub type ValidatorAddr = [u8; 20];

/// One validator's commit vote. Signatures are 65-byte recoverable ECDSA
/// over [`vote_digest`] with that validator's timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitVoteItem {
    /// Vote timestamp in microseconds; differs per validator.
    pub timestamp: u64,
    /// 65-byte recoverable signature `r || s || v`.
    pub signature: Vec<u8>,
}

impl rlp::Encodable for CommitVoteItem {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.timestamp);
        s.append(&self.signature);
    }
}

impl rlp::Decodable for CommitVoteItem {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(Self {
            timestamp: rlp.val_at(0)?,
            signature: rlp.val_at(1)?,
        })
    }
}

/// The commit-vote list certifying one block: a validator bitmap plus the
/// signatures of the voters, ordered by ascending validator index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitVoteList {
    /// Consensus round the block committed in.
    pub round: u32,
    /// Bit `i` (little-endian within each byte) set means validator `i`
    /// voted and has an entry in `items`.
    pub bitmap: Vec<u8>,
    /// One entry per set bitmap bit, in ascending validator index order.
    pub items: Vec<CommitVoteItem>,
}

impl CommitVoteList {
    /// Decodes from wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecoderError> {
        rlp::decode(bytes)
    }

    /// Whether validator `index` has a vote in this list.
    pub fn voted(&self, index: usize) -> bool {
        self.bitmap
            .get(index / 8)
            .is_some_and(|byte| byte >> (index % 8) & 1 == 1)
    }

    /// Ascending validator indexes with a set bitmap bit.
    pub fn voter_indexes(&self) -> Vec<usize> {
        (0..self.bitmap.len() * 8).filter(|i| self.voted(*i)).collect()
    }

    /// Builds the bitmap for a set of voter indexes.
    pub fn bitmap_for(indexes: &[usize], validator_count: usize) -> Vec<u8> {
        let mut bitmap = vec![0u8; validator_count.div_ceil(8)];
        for &i in indexes {
            bitmap[i / 8] |= 1 << (i % 8);
        }
        bitmap
    }
}

impl rlp::Encodable for CommitVoteList {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.round);
        s.append(&self.bitmap);
        s.append_list::<CommitVoteItem, _>(&self.items);
    }
}

impl rlp::Decodable for CommitVoteList {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(Self {
            round: rlp.val_at(0)?,
            bitmap: rlp.val_at(1)?,
            items: rlp.list_at(2)?,
        })
    }
}

/// The digest each commit vote signs: SHA3-256 over the RLP list
/// `[height, round, vote_type, block_hash, timestamp]`.
pub fn vote_digest(height: u64, round: u32, block_hash: &Hash, timestamp: u64) -> [u8; 32] {
    let mut s = RlpStream::new_list(5);
    s.append(&height);
    s.append(&round);
    s.append(&VOTE_TYPE_PRECOMMIT);
    s.append(block_hash);
    s.append(&timestamp);
    sha3_256(&s.out())
}

/// Encodes a validator set in its canonical form: an RLP list of 20-byte
/// addresses. The set's identifying hash is SHA3-256 over these bytes.
pub fn encode_validator_list(validators: &[ValidatorAddr]) -> Vec<u8> {
    let mut s = RlpStream::new_list(validators.len());
    for v in validators {
        s.encoder().encode_value(v);
    }
    s.out().to_vec()
}

/// Decodes a canonical validator-set encoding.
pub fn decode_validator_list(bytes: &[u8]) -> Result<Vec<ValidatorAddr>, DecoderError> {
    let rlp = Rlp::new(bytes);
    let mut out = Vec::with_capacity(rlp.item_count()?);
    for item in rlp.iter() {
        let data = item.data()?;
        let addr: ValidatorAddr = data
            .try_into()
            .map_err(|_| DecoderError::Custom("expected a 20-byte validator address"))?;
        out.push(addr);
    }
    Ok(out)
}

/// The identifying hash of a validator set's canonical encoding.
pub fn validator_list_hash(validators: &[ValidatorAddr]) -> Hash {
    Hash::of(&encode_validator_list(validators))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_vote_list_round_trips() {
        let cvl = CommitVoteList {
            round: 3,
            bitmap: CommitVoteList::bitmap_for(&[0, 2, 3], 4),
            items: vec![
                CommitVoteItem { timestamp: 10, signature: vec![0xaa; 65] },
                CommitVoteItem { timestamp: 11, signature: vec![0xbb; 65] },
                CommitVoteItem { timestamp: 12, signature: vec![0xcc; 65] },
            ],
        };
        let bytes = rlp::encode(&cvl).to_vec();
        let decoded = CommitVoteList::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, cvl);
    }

    #[test]
    fn bitmap_bit_positions() {
        let cvl = CommitVoteList {
            round: 0,
            bitmap: CommitVoteList::bitmap_for(&[1, 8], 9),
            items: Vec::new(),
        };
        assert!(!cvl.voted(0));
        assert!(cvl.voted(1));
        assert!(cvl.voted(8));
        assert!(!cvl.voted(200));
        assert_eq!(cvl.voter_indexes(), vec![1, 8]);
    }

    #[test]
    fn vote_digest_depends_on_every_field() {
        let hash = Hash([0x07; 32]);
        let base = vote_digest(100, 0, &hash, 42);
        assert_ne!(base, vote_digest(101, 0, &hash, 42));
        assert_ne!(base, vote_digest(100, 1, &hash, 42));
        assert_ne!(base, vote_digest(100, 0, &Hash([0x08; 32]), 42));
        assert_ne!(base, vote_digest(100, 0, &hash, 43));
        assert_eq!(base, vote_digest(100, 0, &hash, 42));
    }

    #[test]
    fn validator_list_round_trips_and_hashes() {
        let validators = vec![[0x01u8; 20], [0x02u8; 20]];
        let bytes = encode_validator_list(&validators);
        assert_eq!(decode_validator_list(&bytes).unwrap(), validators);
        assert_eq!(validator_list_hash(&validators), Hash::of(&bytes));
    }

    #[test]
    fn validator_list_rejects_bad_lengths() {
        let mut s = RlpStream::new_list(1);
        s.append(&vec![0u8; 19]);
        assert!(decode_validator_list(&s.out()).is_err());
    }
}
