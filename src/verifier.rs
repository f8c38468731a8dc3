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

//! Light-client header verification against a rolling validator set.

use std::collections::HashMap;

use btp_relayer_types::{
    validator_list_hash, vote_digest, BlockHeader, CommitVoteList, Hash, ValidatorAddr,
};
use btp_relayer_utils::{Error, Result};
use serde::Deserialize;

use crate::wallet::recover_signer;

/// Trusted starting checkpoint for the verifier, deserialized from the
/// receiver's raw options.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierOptions {
    /// Height of the first header to verify.
    pub block_height: u64,
    /// Hash of the validator set certifying that header.
    pub validators_hash: Hash,
}

/// Validates block headers with commit-vote signatures and tracks the
/// validator set as it rotates.
///
/// After verifying height `h`, `next() == h + 1` and
/// `next_validators_hash()` equals `header(h).next_validators_hash`.
pub struct Verifier {
    next: u64,
    next_validators_hash: Hash,
    validators: HashMap<Hash, Vec<ValidatorAddr>>,
}

impl Verifier {
    /// Builds a verifier trusting `validators` (whose canonical hash is
    /// `validators_hash`) to certify the header at `next`.
    pub fn new(next: u64, validators_hash: Hash, validators: Vec<ValidatorAddr>) -> Self {
        let mut cache = HashMap::new();
        cache.insert(validators_hash, validators);
        Self {
            next,
            next_validators_hash: validators_hash,
            validators: cache,
        }
    }

    /// Height of the next header this verifier will accept.
    pub fn next(&self) -> u64 {
        self.next
    }

    /// Hash of the validator set for the next header.
    pub fn next_validators_hash(&self) -> Hash {
        self.next_validators_hash
    }

    /// Whether the cache holds the validator set for `hash`.
    pub fn has_validators(&self, hash: &Hash) -> bool {
        self.validators.contains_key(hash)
    }

    /// Snapshot of the cached validator-set hashes, for fan-out tasks to
    /// decide whether a fetched header needs its next set downloaded.
    pub fn known_validator_hashes(&self) -> std::collections::HashSet<Hash> {
        self.validators.keys().copied().collect()
    }

    /// Checks that `votes` certify `header` with more than two thirds of
    /// the current validator set.
    pub fn verify(&self, header: &BlockHeader, votes: &[u8]) -> Result<()> {
        if header.height != self.next {
            return Err(Error::UnexpectedBlockHeight {
                got: header.height,
                expected: self.next,
            });
        }
        let validators = self
            .validators
            .get(&self.next_validators_hash)
            .ok_or(Error::UnknownValidators)?;

        let block_hash = header.hash();
        let commit_votes = CommitVoteList::from_bytes(votes)?;
        let voters = commit_votes.voter_indexes();
        if voters.len() != commit_votes.items.len() {
            return Err(Error::VerificationFailed {
                height: header.height,
            });
        }

        let mut matched = 0usize;
        for (validator_index, item) in voters.into_iter().zip(&commit_votes.items) {
            let Some(expected) = validators.get(validator_index) else {
                return Err(Error::VerificationFailed {
                    height: header.height,
                });
            };
            let digest = vote_digest(
                header.height,
                commit_votes.round,
                &block_hash,
                item.timestamp,
            );
            match recover_signer(&digest, &item.signature) {
                Ok(signer) if &signer == expected => matched += 1,
                // a bad signature costs that vote, nothing more
                Ok(_) | Err(_) => {}
            }
        }

        let required = validators.len() * 2 / 3;
        if matched <= required {
            return Err(Error::InsufficientVotes {
                got: matched,
                required,
            });
        }
        Ok(())
    }

    /// Advances past `header`, adopting its next validator set. Validators
    /// supplied for an uncached hash are hash-checked before insertion.
    pub fn update(
        &mut self,
        header: &BlockHeader,
        next_validators: Option<Vec<ValidatorAddr>>,
    ) -> Result<()> {
        if let Some(validators) = next_validators {
            if !validators.is_empty() {
                if validator_list_hash(&validators) != header.next_validators_hash {
                    return Err(Error::InvalidHash);
                }
                self.validators
                    .insert(header.next_validators_hash, validators);
            }
        }
        self.next = header.height + 1;
        self.next_validators_hash = header.next_validators_hash;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{KeyWallet, Wallet};
    use btp_relayer_types::{BlockHeaderResult, CommitVoteItem};

    struct Committee {
        wallets: Vec<KeyWallet>,
        validators: Vec<ValidatorAddr>,
        hash: Hash,
    }

    fn committee(n: usize) -> Committee {
        committee_seeded(n, 1)
    }

    fn committee_seeded(n: usize, seed: u8) -> Committee {
        let wallets: Vec<KeyWallet> = (0..n)
            .map(|i| KeyWallet::from_secret_bytes(&[seed + i as u8; 32]).unwrap())
            .collect();
        let validators: Vec<ValidatorAddr> = wallets
            .iter()
            .map(|w| {
                let mut body = [0u8; 20];
                body.copy_from_slice(&hex::decode(&w.address().as_str()[2..]).unwrap());
                body
            })
            .collect();
        let hash = validator_list_hash(&validators);
        Committee {
            wallets,
            validators,
            hash,
        }
    }

    fn header_at(height: u64, next_validators_hash: Hash) -> BlockHeader {
        let result = rlp::encode(&BlockHeaderResult {
            state_hash: Vec::new(),
            patch_receipt_hash: Vec::new(),
            receipt_hash: Hash([0x01; 32]),
            extension_data: Vec::new(),
        })
        .to_vec();
        let header = BlockHeader::new(
            2,
            height,
            1_000_000,
            vec![0x00; 21],
            vec![0x02; 32],
            vec![0x03; 32],
            next_validators_hash,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            result,
        );
        // run through the wire form so hashing covers served bytes
        BlockHeader::from_bytes(&header.to_bytes()).unwrap()
    }

    fn votes_for(c: &Committee, header: &BlockHeader, voters: &[usize]) -> Vec<u8> {
        let block_hash = header.hash();
        let items = voters
            .iter()
            .map(|&i| {
                let timestamp = 1_000 + i as u64;
                let digest = vote_digest(header.height, 0, &block_hash, timestamp);
                CommitVoteItem {
                    timestamp,
                    signature: c.wallets[i].sign(&digest).unwrap(),
                }
            })
            .collect();
        let cvl = CommitVoteList {
            round: 0,
            bitmap: CommitVoteList::bitmap_for(voters, c.validators.len()),
            items,
        };
        rlp::encode(&cvl).to_vec()
    }

    #[test]
    fn accepts_supermajority() {
        let c = committee(4);
        let header = header_at(100, c.hash);
        let verifier = Verifier::new(100, c.hash, c.validators.clone());
        let votes = votes_for(&c, &header, &[0, 1, 2]);
        verifier.verify(&header, &votes).unwrap();
    }

    #[test]
    fn rejects_two_thirds_or_less() {
        let c = committee(4);
        let header = header_at(100, c.hash);
        let verifier = Verifier::new(100, c.hash, c.validators.clone());
        // 2 of 4 does not exceed the 2/3 threshold
        let votes = votes_for(&c, &header, &[0, 1]);
        assert!(matches!(
            verifier.verify(&header, &votes).unwrap_err(),
            Error::InsufficientVotes { got: 2, required: 2 }
        ));
    }

    #[test]
    fn rejects_wrong_height() {
        let c = committee(4);
        let header = header_at(101, c.hash);
        let verifier = Verifier::new(100, c.hash, c.validators.clone());
        let votes = votes_for(&c, &header, &[0, 1, 2]);
        assert!(matches!(
            verifier.verify(&header, &votes).unwrap_err(),
            Error::UnexpectedBlockHeight { got: 101, expected: 100 }
        ));
    }

    #[test]
    fn rejects_votes_for_a_different_block() {
        let c = committee(4);
        let header = header_at(100, c.hash);
        let other = header_at(100, Hash([0x44; 32]));
        let verifier = Verifier::new(100, c.hash, c.validators.clone());
        // votes certify `other`, not `header`
        let votes = votes_for(&c, &other, &[0, 1, 2]);
        assert!(verifier.verify(&header, &votes).is_err());
    }

    #[test]
    fn non_validator_signatures_do_not_count() {
        let c = committee(4);
        let outsider = committee_seeded(4, 0x60); // keys outside the committee
        let header = header_at(100, c.hash);
        let verifier = Verifier::new(100, c.hash, c.validators.clone());
        let votes = votes_for(&outsider, &header, &[0, 1, 2]);
        assert!(matches!(
            verifier.verify(&header, &votes).unwrap_err(),
            Error::InsufficientVotes { .. }
        ));
    }

    #[test]
    fn update_advances_and_checks_cache_insertions() {
        let c = committee(4);
        let next = committee(3);
        let header = header_at(100, next.hash);
        let mut verifier = Verifier::new(100, c.hash, c.validators.clone());

        verifier
            .update(&header, Some(next.validators.clone()))
            .unwrap();
        assert_eq!(verifier.next(), 101);
        assert_eq!(verifier.next_validators_hash(), next.hash);
        assert!(verifier.has_validators(&next.hash));
        assert!(verifier.has_validators(&c.hash)); // never evicted
    }

    #[test]
    fn update_rejects_validators_not_matching_header() {
        let c = committee(4);
        let wrong = committee(3);
        let header = header_at(100, Hash([0x55; 32]));
        let mut verifier = Verifier::new(100, c.hash, c.validators.clone());
        assert!(matches!(
            verifier
                .update(&header, Some(wrong.validators.clone()))
                .unwrap_err(),
            Error::InvalidHash
        ));
    }
}
