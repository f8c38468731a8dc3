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
//! # Relayer Utils Module
//!
//! Shared error type and retry policies for the BTP relayer.

/// Retry functionality
pub mod retry;

/// JSON-RPC error code for a system error on the source chain.
pub const JSONRPC_ERROR_CODE_SYSTEM: i64 = -31000;
/// JSON-RPC error code returned when the transaction pool is full.
pub const JSONRPC_ERROR_CODE_TX_POOL_OVERFLOW: i64 = -31001;
/// JSON-RPC error code while a transaction is still pending.
pub const JSONRPC_ERROR_CODE_PENDING: i64 = -31006;
/// JSON-RPC error code while a transaction is still executing.
pub const JSONRPC_ERROR_CODE_EXECUTING: i64 = -31007;

/// System-error sub-code for a duplicate transaction submission.
pub const SYSTEM_SUB_CODE_DUPLICATE_TX: i64 = 2000;

/// An enum of all possible errors that could be encountered during the
/// execution of the BTP relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Error in the underlying HTTP transport.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Error in the underlying websocket transport.
    #[error(transparent)]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    /// RLP decoding error.
    #[error(transparent)]
    Rlp(#[from] rlp::DecoderError),
    /// Hex decoding error.
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    /// Base64 decoding error.
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
    /// Recoverable ECDSA signing or recovery error.
    #[error(transparent)]
    Signature(#[from] k256::ecdsa::Error),
    /// Error response from the source-chain JSON-RPC server.
    #[error("rpc error code:{code}, message:{message}")]
    Rpc {
        /// The JSON-RPC error code.
        code: i64,
        /// The JSON-RPC error message.
        message: String,
    },
    /// Websocket dial failed.
    #[error("fail to connect websocket")]
    WsConnectFail,
    /// The websocket subscription handshake was rejected by the node.
    #[error("invalid ws response code:{code}, message:{message}")]
    WsInvalidResponse {
        /// Non-zero response code from the node.
        code: i64,
        /// Response message from the node.
        message: String,
    },
    /// A websocket read failed mid-subscription.
    #[error("websocket read error: {0}")]
    WsRead(String),
    /// Data fetched by hash does not hash back to the requested hash.
    #[error("invalid data: hash does not match requested hash")]
    InvalidHash,
    /// A Merkle-Patricia-Trie proof did not connect to its root.
    #[error("mpt: node hash does not match expected hash")]
    MptMismatch,
    /// A Merkle-Patricia-Trie proof was malformed or exhausted early.
    #[error("mpt: {0}")]
    MptInvalidProof(&'static str),
    /// Header verification against the validator set failed.
    #[error("verification failed at height {height}")]
    VerificationFailed {
        /// Height of the offending header.
        height: u64,
    },
    /// Not enough commit votes matched the validator set.
    #[error("insufficient votes: got {got}, required more than {required}")]
    InsufficientVotes {
        /// Number of votes that matched.
        got: usize,
        /// Two-thirds threshold that must be exceeded.
        required: usize,
    },
    /// The verifier has no validator set for the requested hash.
    #[error("unknown validator set hash")]
    UnknownValidators,
    /// An event inside a requested proof set failed the log filter.
    #[error("invalid event")]
    InvalidEvent,
    /// Observed event sequence jumped past the expected one.
    #[error("invalid event seq: got {got}, expected {expected}")]
    InvalidEventSequence {
        /// Sequence carried by the offending event.
        got: u64,
        /// Sequence the subscription expected next.
        expected: u64,
    },
    /// Sync target is behind the verifier.
    #[error("invalid target height: verifier height ({next}) > target height ({target})")]
    InvalidTargetHeight {
        /// Height of the next header the verifier expects.
        next: u64,
        /// Requested sync target.
        target: u64,
    },
    /// A block notification arrived out of the expected order.
    #[error("unexpected block height: got {got}, expected {expected}")]
    UnexpectedBlockHeight {
        /// Height carried by the notification.
        got: u64,
        /// Height the pipeline expected next.
        expected: u64,
    },
    /// The proof response did not cover the receipt plus every event.
    #[error("proof does not include all events: got {got}, expected {expected}")]
    MissingProofs {
        /// Number of proof entries returned.
        got: usize,
        /// `1 + event count` entries that were required.
        expected: usize,
    },
    /// A hex scalar string was malformed.
    #[error("invalid hex value: {0}")]
    InvalidHex(String),
    /// An account or BTP address string was malformed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Invalid construction or subscription arguments.
    #[error("{}", _0)]
    Setup(&'static str),
    /// Retries were exhausted while waiting for a transaction result.
    #[error("retry limit exceeded while waiting for transaction result")]
    RetryLimitExceeded,
    /// The enclosing context was cancelled.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this is the node telling us the transaction pool is full.
    pub fn is_tx_pool_overflow(&self) -> bool {
        matches!(self, Error::Rpc { code, .. } if *code == JSONRPC_ERROR_CODE_TX_POOL_OVERFLOW)
    }

    /// Whether the node reports the transaction as not yet finalized.
    pub fn is_tx_in_progress(&self) -> bool {
        matches!(
            self,
            Error::Rpc { code, .. }
                if *code == JSONRPC_ERROR_CODE_PENDING || *code == JSONRPC_ERROR_CODE_EXECUTING
        )
    }

    /// Extracts the sub-code from a system error message of the form
    /// `E<code>:<description>`. Returns `None` for any other error.
    pub fn system_sub_code(&self) -> Option<i64> {
        match self {
            Error::Rpc { code, message } if *code == JSONRPC_ERROR_CODE_SYSTEM => {
                message.get(1..5).and_then(|s| s.parse().ok())
            }
            _ => None,
        }
    }
}

/// A type alias for the result for the BTP relayer, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_code_parses_from_system_error() {
        let err = Error::Rpc {
            code: JSONRPC_ERROR_CODE_SYSTEM,
            message: "E2000:duplicate transaction".to_string(),
        };
        assert_eq!(err.system_sub_code(), Some(SYSTEM_SUB_CODE_DUPLICATE_TX));
    }

    #[test]
    fn sub_code_ignores_other_codes() {
        let err = Error::Rpc {
            code: JSONRPC_ERROR_CODE_PENDING,
            message: "E2000:pending".to_string(),
        };
        assert_eq!(err.system_sub_code(), None);
        assert!(err.is_tx_in_progress());
    }

    #[test]
    fn overflow_is_detected() {
        let err = Error::Rpc {
            code: JSONRPC_ERROR_CODE_TX_POOL_OVERFLOW,
            message: "tx pool overflow".to_string(),
        };
        assert!(err.is_tx_pool_overflow());
        assert!(!err.is_tx_in_progress());
    }
}
