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

#![warn(missing_docs)]
//! # Relayer Types Module
//!
//! Wire types and codecs for the BTP relayer: the `0x` scalar strings and
//! JSON payloads of the source chain's JSON-RPC API, the RLP structures the
//! light client and proof extractor consume, and the canonical transaction
//! serialization used for signing.

pub mod address;
pub mod block;
pub mod hash;
pub mod header;
pub mod hex;
pub mod receipt;
pub mod serialize;
pub mod transaction;
pub mod votes;

pub use address::{Address, BTPAddress};
pub use block::{
    Block, BlockNotification, BlockRequest, EventFilter, EventNotification, EventRequest,
    WsResponse,
};
pub use hash::{sha3_256, Hash};
pub use header::{BlockHeader, BlockHeaderResult};
pub use hex::{HexBytes, HexInt};
pub use receipt::{Event, EventLog, Message, Receipt, SubscribeOptions, TxResult};
pub use transaction::{
    AddressParam, BlockHeightParam, CallParam, DataHashParam, ProofEventsParam,
    TransactionHashParam, TransactionParam, TransactionResult, TxEventLog,
};
pub use votes::{
    decode_validator_list, encode_validator_list, validator_list_hash, vote_digest,
    CommitVoteItem, CommitVoteList, ValidatorAddr, VOTE_TYPE_PRECOMMIT,
};
