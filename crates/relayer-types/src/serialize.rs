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

//! Canonical transaction serialization for signing.
//!
//! The hashed form of a transaction is `icx_sendTransaction.` followed by a
//! key-sorted dotted encoding of the parameters with the `signature` field
//! excluded. The encoding must reproduce the node's own byte-for-byte, or
//! every signature this relay produces is invalid.

use btp_relayer_utils::{Error, Result};
use serde_json::Value;

use crate::hash::sha3_256;

/// The method prefix prepended before hashing.
pub const SERIALIZE_PREFIX: &[u8] = b"icx_sendTransaction.";

/// Fields excluded from the canonical form.
const EXCLUDED_KEYS: &[&str] = &["signature"];

/// Serializes transaction parameters into the canonical signing form,
/// including the method prefix.
pub fn serialize_transaction(params: &Value) -> Result<Vec<u8>> {
    let obj = params
        .as_object()
        .ok_or(Error::Setup("transaction parameters must be a JSON object"))?;
    let mut out = SERIALIZE_PREFIX.to_vec();
    append_object_body(obj, true, &mut out);
    Ok(out)
}

/// The transaction hash: SHA3-256 over the canonical serialization.
pub fn transaction_hash(params: &Value) -> Result<[u8; 32]> {
    Ok(sha3_256(&serialize_transaction(params)?))
}

fn append_object_body(
    obj: &serde_json::Map<String, Value>,
    top_level: bool,
    out: &mut Vec<u8>,
) {
    // serde_json maps iterate in ascending key order by default; sort
    // explicitly so the canonical form never depends on build features.
    let mut keys: Vec<&String> = obj.keys().collect();
    keys.sort();
    let mut first = true;
    for key in keys {
        if top_level && EXCLUDED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if !first {
            out.push(b'.');
        }
        first = false;
        append_string(key, out);
        out.push(b'.');
        append_value(&obj[key], out);
    }
}

fn append_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"\\0"),
        Value::String(s) => append_string(s, out),
        Value::Object(obj) => {
            out.push(b'{');
            append_object_body(obj, false, out);
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b'.');
                }
                append_value(item, out);
            }
            out.push(b']');
        }
        // scalars outside the protocol's string domain keep their JSON text
        Value::Bool(b) => out.extend_from_slice(b.to_string().as_bytes()),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
    }
}

fn append_string(s: &str, out: &mut Vec<u8>) {
    for &b in s.as_bytes() {
        if matches!(b, b'\\' | b'.' | b'{' | b'}' | b'[' | b']') {
            out.push(b'\\');
        }
        out.push(b);
    }
}
