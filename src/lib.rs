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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # BTP Relayer Crate
//!
//! A crate for relaying BTP (Blockchain Transmission Protocol) messages
//! from an ICON-class source chain to a destination chain.
//!
//! ## Overview
//!
//! A BTP relay watches a message-broker contract on the source chain for
//! `Message(str,int,bytes)` events, proves each one out of the chain's
//! receipt and event-log tries, and hands the resulting receipts to a
//! destination-chain sender in strict sequence order.
//!
//! This crate implements the source-chain side of that pipeline:
//!
//!   1. A JSON-RPC + websocket [`client`] to a source-chain full node,
//!      including the transaction-signing helpers the sender side shares.
//!   2. A [`verifier`]: a light client that validates each block header
//!      against a rolling validator set using commit-vote signatures.
//!   3. A proof extractor ([`mpt`]) that walks Merkle-Patricia-Trie proofs
//!      for receipts and event logs.
//!   4. A [`receiver`] that orchestrates the rest: it subscribes to block
//!      notifications, fans fetches out across many blocks, re-serializes
//!      the results into ascending height order, verifies, filters and
//!      sequences events, and emits ordered receipt messages.
//!
//! The receiver is created once per subscription with a trusted
//! `{height, sequence, validators hash}` checkpoint and lives until the
//! caller's [`context::RelayerContext`] shuts down. It never skips a
//! height: either it makes progress at the next height or it reconnects
//! and resyncs.

/// A JSON-RPC + websocket client to a source-chain full node.
pub mod client;
/// A module for managing the context shared by relayer tasks.
pub mod context;
/// Merkle-Patricia-Trie proof verification for receipts and event logs.
pub mod mpt;
/// The receive pipeline: subscribe, fetch, order, verify, emit.
pub mod receiver;
/// Light-client verification of block headers.
pub mod verifier;
/// Transaction signing over secp256k1.
pub mod wallet;

pub use btp_relayer_utils::{Error, Result};
