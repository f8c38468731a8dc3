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

//! JSON-RPC client to a source-chain full node.
//!
//! Unary calls go over HTTP to `/api/v3`; block and event subscriptions go
//! over websocket (see [`ws`]). Binary results (headers, votes, proofs,
//! hashed data) arrive base64-encoded inside JSON strings.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use num_bigint::BigInt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use btp_relayer_types::{
    decode_validator_list, serialize, Block, BlockHeader, BlockHeightParam, CallParam,
    DataHashParam, Hash, HexBytes, HexInt, ProofEventsParam, TransactionHashParam,
    TransactionParam, TransactionResult, ValidatorAddr,
};
use btp_relayer_utils::{Error, Result, SYSTEM_SUB_CODE_DUPLICATE_TX};

use crate::context::Shutdown;
use crate::wallet::Wallet;

pub mod ws;

/// Sleep between resubmissions after a transaction-pool overflow.
pub const DEFAULT_SEND_TX_RETRY_INTERVAL: Duration = Duration::from_secs(3);
/// Poll interval while a submitted transaction is pending or executing.
pub const DEFAULT_GET_TX_RESULT_POLLING_INTERVAL: Duration = Duration::from_millis(1500);
/// Bounded attempts for the cancellable result-wait variant.
pub const WAIT_FOR_RESULT_MAX_ATTEMPTS: usize = 10;
/// Idle HTTP connections kept per host.
const MAX_IDLE_CONNS_PER_HOST: usize = 1000;

/// Name of the node's custom option header.
pub const HEADER_KEY_ICON_OPTIONS: &str = "Icon-Options";
/// Reserved option key enabling debug endpoints.
pub const ICON_OPTIONS_DEBUG: &str = "debug";
/// Reserved option key carrying a request timeout hint.
pub const ICON_OPTIONS_TIMEOUT: &str = "timeout";

/// Key/value options carried in the `Icon-Options` header as
/// `key=value,key=value`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IconOptions(BTreeMap<String, String>);

impl IconOptions {
    /// Sets an option.
    pub fn set(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    /// Reads an option; empty when unset.
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or("")
    }

    /// Removes an option.
    pub fn del(&mut self, key: &str) {
        self.0.remove(key);
    }

    /// Sets a boolean option.
    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set(key, if value { "true" } else { "false" });
    }

    /// Sets an integer option.
    pub fn set_int(&mut self, key: &str, value: i64) {
        self.set(key, &value.to_string());
    }

    /// Renders the header value.
    pub fn to_header_value(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parses a header value; keys without `=` map to the empty string.
    pub fn from_header_value(value: &str) -> Self {
        let mut opts = Self::default();
        for kv in value.split(',').filter(|kv| !kv.is_empty()) {
            match kv.split_once('=') {
                Some((k, v)) => opts.set(k, v),
                None => opts.set(kv, ""),
            }
        }
        opts
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// A JSON-RPC + websocket client bound to one node endpoint.
#[derive(Debug)]
pub struct Client {
    http: reqwest::Client,
    endpoint: url::Url,
    icon_options: String,
    next_id: AtomicU64,
    next_conn_id: AtomicU64,
    conns: Mutex<BTreeMap<String, mpsc::Sender<()>>>,
}

impl Client {
    /// Builds a client for `endpoint`, e.g. `http://node:9080/api/v3`.
    pub fn new(endpoint: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_CONNS_PER_HOST)
            .build()?;
        let mut opts = IconOptions::default();
        opts.set_bool(ICON_OPTIONS_DEBUG, true);
        Ok(Self {
            http,
            endpoint: url::Url::parse(endpoint)?,
            icon_options: opts.to_header_value(),
            next_id: AtomicU64::new(1),
            next_conn_id: AtomicU64::new(1),
            conns: Mutex::new(BTreeMap::new()),
        })
    }

    /// The configured HTTP endpoint.
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    async fn call_method<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<R> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut body = serde_json::json!({ "jsonrpc": "2.0", "id": id, "method": method });
        if let Some(params) = params {
            body["params"] = params;
        }
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(HEADER_KEY_ICON_OPTIONS, &self.icon_options)
            .json(&body)
            .send()
            .await?;
        let rpc: RpcResponse = response.json().await?;
        if let Some(err) = rpc.error {
            return Err(Error::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(serde_json::from_value(rpc.result.unwrap_or(Value::Null))?)
    }

    async fn call_for_bytes(&self, method: &str, params: Value) -> Result<Vec<u8>> {
        let encoded: String = self.call_method(method, Some(params)).await?;
        Ok(BASE64.decode(encoded)?)
    }

    /// `icx_getLastBlock`
    pub async fn get_last_block(&self) -> Result<Block> {
        self.call_method("icx_getLastBlock", None).await
    }

    /// `icx_getBlockByHeight`
    pub async fn get_block_by_height(&self, height: u64) -> Result<Block> {
        let p = BlockHeightParam {
            height: HexInt::from_u64(height),
        };
        self.call_method("icx_getBlockByHeight", Some(serde_json::to_value(p)?))
            .await
    }

    /// `icx_getBlockHeaderByHeight`: the raw RLP header bytes.
    pub async fn get_block_header_by_height(&self, height: u64) -> Result<Vec<u8>> {
        let p = BlockHeightParam {
            height: HexInt::from_u64(height),
        };
        self.call_for_bytes("icx_getBlockHeaderByHeight", serde_json::to_value(p)?)
            .await
    }

    /// `icx_getVotesByHeight`: the raw RLP commit-vote bytes.
    pub async fn get_votes_by_height(&self, height: u64) -> Result<Vec<u8>> {
        let p = BlockHeightParam {
            height: HexInt::from_u64(height),
        };
        self.call_for_bytes("icx_getVotesByHeight", serde_json::to_value(p)?)
            .await
    }

    /// `icx_getDataByHash`. The caller must verify
    /// `SHA3-256(data) == hash`; [`Client::get_validators_by_hash`] does.
    pub async fn get_data_by_hash(&self, p: &DataHashParam) -> Result<Vec<u8>> {
        self.call_for_bytes("icx_getDataByHash", serde_json::to_value(p)?)
            .await
    }

    /// `icx_getProofForEvents`: element 0 proves the receipt, the rest one
    /// event each; every proof is a list of trie nodes.
    pub async fn get_proof_for_events(&self, p: &ProofEventsParam) -> Result<Vec<Vec<Vec<u8>>>> {
        let encoded: Vec<Vec<String>> = self
            .call_method("icx_getProofForEvents", Some(serde_json::to_value(p)?))
            .await?;
        let mut proofs = Vec::with_capacity(encoded.len());
        for proof in encoded {
            let mut nodes = Vec::with_capacity(proof.len());
            for node in proof {
                nodes.push(BASE64.decode(node)?);
            }
            proofs.push(nodes);
        }
        Ok(proofs)
    }

    /// `icx_sendTransaction`
    pub async fn send_transaction(&self, p: &TransactionParam) -> Result<HexBytes> {
        self.call_method("icx_sendTransaction", Some(serde_json::to_value(p)?))
            .await
    }

    /// `icx_sendTransactionAndWait`
    pub async fn send_transaction_and_wait(&self, p: &TransactionParam) -> Result<HexBytes> {
        self.call_method("icx_sendTransactionAndWait", Some(serde_json::to_value(p)?))
            .await
    }

    /// `icx_getTransactionResult`
    pub async fn get_transaction_result(
        &self,
        p: &TransactionHashParam,
    ) -> Result<TransactionResult> {
        self.call_method("icx_getTransactionResult", Some(serde_json::to_value(p)?))
            .await
    }

    /// `icx_waitTransactionResult`
    pub async fn wait_transaction_result(
        &self,
        p: &TransactionHashParam,
    ) -> Result<TransactionResult> {
        self.call_method("icx_waitTransactionResult", Some(serde_json::to_value(p)?))
            .await
    }

    /// `icx_call`: a read-only contract call with a decoded result.
    pub async fn call<R: DeserializeOwned>(&self, p: &CallParam) -> Result<R> {
        self.call_method("icx_call", Some(serde_json::to_value(p)?))
            .await
    }

    /// `icx_getBalance`
    pub async fn get_balance(&self, p: &btp_relayer_types::AddressParam) -> Result<BigInt> {
        let balance: HexInt = self
            .call_method("icx_getBalance", Some(serde_json::to_value(p)?))
            .await?;
        balance.value()
    }

    /// Stamps the timestamp, computes the canonical transaction hash and
    /// attaches the wallet's base64 signature.
    pub fn sign_transaction(&self, wallet: &dyn Wallet, p: &mut TransactionParam) -> Result<()> {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| Error::Setup("system clock before unix epoch"))?
            .as_micros() as u64;
        p.timestamp = Some(HexInt::from_u64(micros));
        p.signature = None;

        let params = serde_json::to_value(&*p)?;
        let tx_hash = serialize::transaction_hash(&params)?;
        p.tx_hash = Some(HexBytes::from_bytes(&tx_hash));
        let signature = wallet.sign(&tx_hash)?;
        p.signature = Some(BASE64.encode(signature));
        Ok(())
    }

    /// Submits a signed transaction and waits for its execution result.
    ///
    /// Pool overflow sleeps and resubmits; a system error with the
    /// duplicate-transaction sub-code means the node already holds the
    /// transaction, so its hash is polled like a successful submit.
    pub async fn send_transaction_and_get_result(
        &self,
        p: &TransactionParam,
    ) -> Result<(HexBytes, TransactionResult)> {
        let tx_hash = loop {
            match self.send_transaction(p).await {
                Ok(hash) => break hash,
                Err(err) if err.is_tx_pool_overflow() => {
                    tracing::debug!("tx pool overflow, retrying send");
                    tokio::time::sleep(DEFAULT_SEND_TX_RETRY_INTERVAL).await;
                }
                Err(err) if err.system_sub_code() == Some(SYSTEM_SUB_CODE_DUPLICATE_TX) => {
                    let hash = p
                        .tx_hash
                        .clone()
                        .ok_or(Error::Setup("transaction is not signed"))?;
                    tracing::debug!(tx_hash = %hash, "duplicate transaction, treating as accepted");
                    break hash;
                }
                Err(err) => return Err(err),
            }
        };

        let thp = TransactionHashParam {
            tx_hash: tx_hash.clone(),
        };
        loop {
            tokio::time::sleep(DEFAULT_GET_TX_RESULT_POLLING_INTERVAL).await;
            match self.get_transaction_result(&thp).await {
                Ok(result) => return Ok((tx_hash, result)),
                Err(err) if err.is_tx_in_progress() => {
                    tracing::debug!(tx_hash = %thp.tx_hash, "retry get_transaction_result");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Like the polling phase of [`Client::send_transaction_and_get_result`],
    /// but cancellable and bounded to [`WAIT_FOR_RESULT_MAX_ATTEMPTS`].
    pub async fn wait_for_results(
        &self,
        shutdown: &mut Shutdown,
        p: &TransactionHashParam,
    ) -> Result<TransactionResult> {
        let mut ticker = tokio::time::interval(DEFAULT_GET_TX_RESULT_POLLING_INTERVAL);
        ticker.tick().await; // the first tick is immediate
        let mut attempts = 0;
        loop {
            tokio::select! {
                _ = shutdown.recv() => return Err(Error::Cancelled),
                _ = ticker.tick() => {
                    attempts += 1;
                    match self.get_transaction_result(p).await {
                        Ok(result) => return Ok(result),
                        Err(err) if err.is_tx_in_progress() => {
                            if attempts >= WAIT_FOR_RESULT_MAX_ATTEMPTS {
                                return Err(Error::RetryLimitExceeded);
                            }
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }

    /// Fetches and decodes the header at `height`, keeping the wire bytes
    /// for hashing.
    pub async fn get_block_header(&self, height: u64) -> Result<BlockHeader> {
        let bytes = self.get_block_header_by_height(height).await?;
        Ok(BlockHeader::from_bytes(&bytes)?)
    }

    /// Fetches the validator set identified by `hash`, enforcing
    /// `SHA3-256(data) == hash` before decoding.
    pub async fn get_validators_by_hash(&self, hash: &Hash) -> Result<Vec<ValidatorAddr>> {
        let data = self
            .get_data_by_hash(&DataHashParam {
                hash: HexBytes::from_bytes(hash.as_bytes()),
            })
            .await?;
        if Hash::of(&data) != *hash {
            return Err(Error::InvalidHash);
        }
        Ok(decode_validator_list(&data)?)
    }
}
