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

//! Merkle-Patricia-Trie proof verification for receipts and event logs.
//!
//! Pure functions only; the pipeline does the fetching. Nodes hash with
//! SHA3-256 and encode as RLP; paths use hex-prefix compaction; children
//! whose encoding is shorter than 32 bytes are embedded in the parent.

use btp_relayer_types::Hash;
use btp_relayer_utils::{Error, Result};
use rlp::Rlp;

const HP_FLAG_LEAF: u8 = 0x2;
const HP_FLAG_ODD: u8 = 0x1;

/// Walks `proof` from `root` along the nibbles of `key` and returns the
/// leaf value. `key` is the RLP encoding of a receipt or event index.
///
/// Every hash hop consumes the next proof element; a hash mismatch anywhere
/// fails the whole proof.
pub fn mpt_prove(key: &[u8], proof: &[Vec<u8>], root: &Hash) -> Result<Vec<u8>> {
    let nibbles = to_nibbles(key);
    let mut pos = 0;
    let mut proof_idx = 0;
    let mut expected = *root;

    'hop: loop {
        let node_bytes = proof
            .get(proof_idx)
            .ok_or(Error::MptInvalidProof("proof exhausted before the leaf"))?;
        if Hash::of(node_bytes) != expected {
            return Err(Error::MptMismatch);
        }
        proof_idx += 1;

        let mut node = Rlp::new(node_bytes);
        loop {
            match node.item_count()? {
                17 => {
                    if pos == nibbles.len() {
                        return Ok(node.at(16)?.data()?.to_vec());
                    }
                    let child = node.at(nibbles[pos] as usize)?;
                    pos += 1;
                    if child.is_list() {
                        node = child;
                        continue;
                    }
                    expected = child_hash(&child)?;
                    continue 'hop;
                }
                2 => {
                    let (is_leaf, path) = decode_hex_prefix(node.at(0)?.data()?)?;
                    if is_leaf {
                        if nibbles[pos..] != path[..] {
                            return Err(Error::MptInvalidProof("leaf path does not match key"));
                        }
                        return Ok(node.at(1)?.data()?.to_vec());
                    }
                    if !nibbles[pos..].starts_with(&path) {
                        return Err(Error::MptInvalidProof("extension path does not match key"));
                    }
                    pos += path.len();
                    let child = node.at(1)?;
                    if child.is_list() {
                        node = child;
                        continue;
                    }
                    expected = child_hash(&child)?;
                    continue 'hop;
                }
                _ => return Err(Error::MptInvalidProof("unexpected node arity")),
            }
        }
    }
}

fn child_hash(child: &Rlp) -> Result<Hash> {
    let data = child.data()?;
    if data.is_empty() {
        return Err(Error::MptInvalidProof("key not present in trie"));
    }
    Hash::from_slice(data).map_err(|_| Error::MptInvalidProof("malformed child reference"))
}

fn to_nibbles(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() * 2);
    for b in key {
        out.push(b >> 4);
        out.push(b & 0x0f);
    }
    out
}

fn decode_hex_prefix(encoded: &[u8]) -> Result<(bool, Vec<u8>)> {
    let first = *encoded
        .first()
        .ok_or(Error::MptInvalidProof("empty path encoding"))?;
    let flags = first >> 4;
    if flags > 0x3 {
        return Err(Error::MptInvalidProof("bad path flags"));
    }
    let is_leaf = flags & HP_FLAG_LEAF != 0;
    let mut path = Vec::new();
    if flags & HP_FLAG_ODD != 0 {
        path.push(first & 0x0f);
    }
    for b in &encoded[1..] {
        path.push(b >> 4);
        path.push(b & 0x0f);
    }
    Ok((is_leaf, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlp::RlpStream;

    fn encode_hex_prefix(is_leaf: bool, path: &[u8]) -> Vec<u8> {
        let mut flags = if is_leaf { HP_FLAG_LEAF } else { 0 };
        let odd = path.len() % 2 == 1;
        if odd {
            flags |= HP_FLAG_ODD;
        }
        let mut out = Vec::new();
        if odd {
            out.push(flags << 4 | path[0]);
        } else {
            out.push(flags << 4);
        }
        let rest = if odd { &path[1..] } else { path };
        for pair in rest.chunks(2) {
            out.push(pair[0] << 4 | pair[1]);
        }
        out
    }

    fn leaf_node(path: &[u8], value: &[u8]) -> Vec<u8> {
        let mut s = RlpStream::new_list(2);
        s.append(&encode_hex_prefix(true, path));
        s.append(&value.to_vec());
        s.out().to_vec()
    }

    fn rlp_key(index: u64) -> Vec<u8> {
        rlp::encode(&index).to_vec()
    }

    #[test]
    fn proves_single_leaf_trie() {
        let key = rlp_key(0); // 0x80 -> nibbles [8, 0]
        let value = b"leaf-value".to_vec();
        let node = leaf_node(&to_nibbles(&key), &value);
        let root = Hash::of(&node);
        assert_eq!(mpt_prove(&key, &[node], &root).unwrap(), value);
    }

    #[test]
    fn proves_through_branch_with_hashed_child() {
        let key = rlp_key(0); // nibbles [8, 0]
        let value = vec![0xaa; 40]; // forces the leaf over 32 encoded bytes
        let leaf = leaf_node(&[0], &value); // branch consumes the first nibble

        let mut s = RlpStream::new_list(17);
        for i in 0..16 {
            if i == 8 {
                s.append(&Hash::of(&leaf).as_bytes().to_vec());
            } else {
                s.append_empty_data();
            }
        }
        s.append_empty_data(); // no value at the branch
        let branch = s.out().to_vec();
        let root = Hash::of(&branch);

        assert_eq!(mpt_prove(&key, &[branch, leaf], &root).unwrap(), value);
    }

    #[test]
    fn proves_through_branch_with_embedded_child() {
        let key = rlp_key(0);
        let value = b"v".to_vec(); // small leaf stays embedded
        let leaf = leaf_node(&[0], &value);
        assert!(leaf.len() < 32);

        let mut s = RlpStream::new_list(17);
        for i in 0..16 {
            if i == 8 {
                s.append_raw(&leaf, 1);
            } else {
                s.append_empty_data();
            }
        }
        s.append_empty_data();
        let branch = s.out().to_vec();
        let root = Hash::of(&branch);

        assert_eq!(mpt_prove(&key, &[branch], &root).unwrap(), value);
    }

    #[test]
    fn proves_through_extension() {
        let key = rlp_key(0); // nibbles [8, 0]
        let value = vec![0xbb; 40];
        let leaf = leaf_node(&[], &value);

        let mut s = RlpStream::new_list(2);
        s.append(&encode_hex_prefix(false, &[8, 0]));
        s.append(&Hash::of(&leaf).as_bytes().to_vec());
        let extension = s.out().to_vec();
        let root = Hash::of(&extension);

        assert_eq!(mpt_prove(&key, &[extension, leaf], &root).unwrap(), value);
    }

    #[test]
    fn rejects_wrong_root() {
        let key = rlp_key(0);
        let node = leaf_node(&to_nibbles(&key), b"value");
        let err = mpt_prove(&key, &[node], &Hash([0xff; 32])).unwrap_err();
        assert!(matches!(err, Error::MptMismatch));
    }

    #[test]
    fn rejects_tampered_node() {
        let key = rlp_key(0);
        let mut node = leaf_node(&to_nibbles(&key), b"value");
        let root = Hash::of(&node);
        let last = node.len() - 1;
        node[last] ^= 0x01;
        assert!(matches!(
            mpt_prove(&key, &[node], &root).unwrap_err(),
            Error::MptMismatch
        ));
    }

    #[test]
    fn rejects_wrong_key_path() {
        let key = rlp_key(0);
        let node = leaf_node(&to_nibbles(&rlp_key(1)), b"value");
        let root = Hash::of(&node);
        assert!(mpt_prove(&key, &[node], &root).is_err());
    }

    #[test]
    fn rejects_exhausted_proof() {
        let key = rlp_key(0);
        let value = vec![0xcc; 40];
        let leaf = leaf_node(&[0], &value);
        let mut s = RlpStream::new_list(17);
        for i in 0..16 {
            if i == 8 {
                s.append(&Hash::of(&leaf).as_bytes().to_vec());
            } else {
                s.append_empty_data();
            }
        }
        s.append_empty_data();
        let branch = s.out().to_vec();
        let root = Hash::of(&branch);
        // proof stops after the branch even though the leaf is hashed
        assert!(mpt_prove(&key, &[branch], &root).is_err());
    }
}
