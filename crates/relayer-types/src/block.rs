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

//! JSON payloads for block queries and websocket block/event monitoring.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::hex::{HexBytes, HexInt};

/// A block as returned by `icx_getLastBlock` / `icx_getBlockByHeight`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    /// Hash of this block.
    #[serde(rename = "block_hash", default)]
    pub block_hash: Option<HexBytes>,
    /// Block format version.
    #[serde(default)]
    pub version: Option<HexInt>,
    /// Height of this block.
    pub height: u64,
    /// Hash of the previous block.
    #[serde(rename = "prev_block_hash", default)]
    pub prev_block_hash: Option<HexBytes>,
    /// Root of the transaction Merkle tree.
    #[serde(rename = "merkle_tree_root_hash", default)]
    pub merkle_tree_root_hash: Option<HexBytes>,
    /// Proposing node identifier.
    #[serde(rename = "peer_id", default)]
    pub peer_id: Option<String>,
    /// Block timestamp in microseconds.
    #[serde(rename = "time_stamp", default)]
    pub time_stamp: Option<u64>,
}

/// An event-log filter submitted as part of a monitoring request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFilter {
    /// Contract address the event must be emitted from.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub addr: Option<Address>,
    /// Event signature, e.g. `Message(str,int,bytes)`.
    #[serde(rename = "event")]
    pub signature: String,
    /// Required values for the indexed fields; `None` entries are wildcards.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub indexed: Vec<Option<String>>,
}

/// The request written to the `/block` websocket endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRequest {
    /// Height at which to start streaming notifications.
    pub height: HexInt,
    /// Event filters; the node reports matching event indexes per filter.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub event_filters: Vec<EventFilter>,
}

/// The request written to the `/event` websocket endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRequest {
    /// Height at which to start streaming notifications.
    pub height: HexInt,
    /// The single filter events must match.
    #[serde(flatten)]
    pub filter: EventFilter,
}

/// First message the node sends after a websocket subscription request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsResponse {
    /// Zero on success.
    pub code: i64,
    /// Failure detail when `code != 0`.
    #[serde(default)]
    pub message: String,
}

/// A streamed block notification.
///
/// `indexes[f][i]` is the i-th matching receipt index for filter `f`, and
/// `events[f][i]` the event-log indexes inside that receipt. Ordering within
/// a notification is significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockNotification {
    /// Hash of the notified block.
    pub hash: HexBytes,
    /// Height of the notified block.
    pub height: HexInt,
    /// Matching receipt indexes, one list per filter.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub indexes: Vec<Vec<HexInt>>,
    /// Matching event-log indexes, parallel to `indexes`.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<Vec<Vec<HexInt>>>,
}

/// A streamed event notification from the `/event` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventNotification {
    /// Hash of the block containing the event.
    pub hash: HexBytes,
    /// Height of the block containing the event.
    pub height: HexInt,
    /// Receipt index inside the block.
    pub index: HexInt,
    /// Event-log indexes inside the receipt.
    #[serde(default)]
    pub events: Vec<HexInt>,
}
