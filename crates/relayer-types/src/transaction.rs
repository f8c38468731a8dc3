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

//! JSON parameter and result payloads for the unary JSON-RPC methods.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::Address;
use crate::hex::{HexBytes, HexInt};

/// Parameters of `icx_sendTransaction`.
///
/// `tx_hash` is local bookkeeping filled by transaction signing and never
/// serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionParam {
    /// Protocol version (`0x3`).
    pub version: HexInt,
    /// Sender address.
    pub from: Address,
    /// Receiver address.
    pub to: Address,
    /// Transferred amount in loop.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<HexInt>,
    /// Maximum step budget.
    #[serde(rename = "stepLimit")]
    pub step_limit: HexInt,
    /// Microsecond timestamp; stamped at signing time.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<HexInt>,
    /// Network identifier.
    pub nid: HexInt,
    /// Arbitrary nonce.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub nonce: Option<HexInt>,
    /// `call`, `deploy`, `message` or absent for plain transfers.
    #[serde(rename = "dataType", skip_serializing_if = "Option::is_none", default)]
    pub data_type: Option<String>,
    /// Payload interpreted according to `data_type`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
    /// Base64 recoverable signature; excluded from canonical serialization.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<String>,
    /// Hash the signature covers.
    #[serde(skip)]
    pub tx_hash: Option<HexBytes>,
}

/// Parameters of `icx_getTransactionResult` / `icx_waitTransactionResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionHashParam {
    /// Hash of the transaction to look up.
    #[serde(rename = "txHash")]
    pub tx_hash: HexBytes,
}

/// Parameters of the height-indexed block queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeightParam {
    /// Height to query.
    pub height: HexInt,
}

/// Parameters of `icx_getDataByHash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataHashParam {
    /// Hash of the data to fetch.
    pub hash: HexBytes,
}

/// Parameters of `icx_getProofForEvents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofEventsParam {
    /// Receipt index inside the block.
    pub index: HexInt,
    /// Hash of the block the receipt belongs to.
    #[serde(rename = "hash")]
    pub block_hash: HexBytes,
    /// Event-log indexes to prove, in notification order.
    pub events: Vec<HexInt>,
}

/// Parameters of `icx_getBalance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressParam {
    /// Account to query.
    pub address: Address,
}

/// Parameters of `icx_call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallParam {
    /// Caller address.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub from: Option<Address>,
    /// Contract to call.
    pub to: Address,
    /// Always `call`.
    #[serde(rename = "dataType")]
    pub data_type: String,
    /// Method and parameters.
    pub data: Value,
}

impl CallParam {
    /// A read-only call to `method` on `to` with JSON `params`.
    pub fn new(from: Option<Address>, to: Address, method: &str, params: Option<Value>) -> Self {
        let mut data = serde_json::json!({ "method": method });
        if let Some(params) = params {
            data["params"] = params;
        }
        Self {
            from,
            to,
            data_type: "call".to_string(),
            data,
        }
    }
}

/// An event log inside a JSON transaction result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxEventLog {
    /// Emitting contract.
    #[serde(rename = "scoreAddress")]
    pub score_address: Address,
    /// Signature plus indexed arguments.
    pub indexed: Vec<String>,
    /// Non-indexed arguments.
    #[serde(default)]
    pub data: Vec<String>,
}

/// Result of `icx_getTransactionResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResult {
    /// `0x1` on success, `0x0` on failure.
    pub status: HexInt,
    /// Receiver of the transaction.
    pub to: Address,
    /// Hash of the transaction.
    #[serde(rename = "txHash")]
    pub tx_hash: HexBytes,
    /// Height of the including block.
    #[serde(rename = "blockHeight")]
    pub block_height: HexInt,
    /// Hash of the including block.
    #[serde(rename = "blockHash")]
    pub block_hash: HexBytes,
    /// Steps consumed by this transaction.
    #[serde(rename = "stepUsed")]
    pub step_used: HexInt,
    /// Steps consumed by the block up to and including this transaction.
    #[serde(rename = "cumulativeStepUsed")]
    pub cumulative_step_used: HexInt,
    /// Step price paid.
    #[serde(rename = "stepPrice")]
    pub step_price: HexInt,
    /// Event logs emitted during execution.
    #[serde(rename = "eventLogs", default)]
    pub event_logs: Vec<TxEventLog>,
    /// Address of a newly deployed contract, if any.
    #[serde(rename = "scoreAddress", skip_serializing_if = "Option::is_none", default)]
    pub score_address: Option<Address>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_param_omits_empty_fields() {
        let p = TransactionParam {
            version: HexInt::from_u64(3),
            from: Address::new("hxbe258ceb872e08851f1f59694dac2558708ece11").unwrap(),
            to: Address::new("cxf285a0b159145dfbedb4dd0d1d9eda0db9a5ba44").unwrap(),
            value: None,
            step_limit: HexInt::from_u64(0x1000),
            timestamp: None,
            nid: HexInt::from_u64(1),
            nonce: None,
            data_type: None,
            data: None,
            signature: None,
            tx_hash: None,
        };
        let v = serde_json::to_value(&p).unwrap();
        let obj = v.as_object().unwrap();
        assert!(!obj.contains_key("value"));
        assert!(!obj.contains_key("signature"));
        assert!(!obj.contains_key("tx_hash"));
        assert_eq!(v["stepLimit"], "0x1000");
    }

    #[test]
    fn call_param_builds_method_data() {
        let p = CallParam::new(
            None,
            Address::new("cxf285a0b159145dfbedb4dd0d1d9eda0db9a5ba44").unwrap(),
            "getStatus",
            Some(serde_json::json!({ "link": "btp://0x5.pra/dst" })),
        );
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["dataType"], "call");
        assert_eq!(v["data"]["method"], "getStatus");
        assert_eq!(v["data"]["params"]["link"], "btp://0x5.pra/dst");
    }
}
