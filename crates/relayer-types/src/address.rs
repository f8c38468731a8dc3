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

//! Account addresses (`hx…`/`cx…`) and BTP addresses (`btp://net/contract`).

use btp_relayer_utils::{Error, Result};
use serde::{Deserialize, Serialize};

const CONTRACT_PREFIX: &str = "cx";
const ACCOUNT_PREFIX: &str = "hx";

/// A source-chain account address: a two-letter kind prefix (`hx` for an
/// externally owned account, `cx` for a contract) followed by 40 hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Wraps an address string after validating its shape.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        let body = s
            .strip_prefix(CONTRACT_PREFIX)
            .or_else(|| s.strip_prefix(ACCOUNT_PREFIX))
            .ok_or_else(|| Error::InvalidAddress(s.clone()))?;
        if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidAddress(s));
        }
        Ok(Self(s))
    }

    /// Builds a contract address from its 20-byte body.
    pub fn contract_from_body(body: &[u8; 20]) -> Self {
        Self(format!("{CONTRACT_PREFIX}{}", hex::encode(body)))
    }

    /// Builds an account address from its 20-byte body.
    pub fn account_from_body(body: &[u8; 20]) -> Self {
        Self(format!("{ACCOUNT_PREFIX}{}", hex::encode(body)))
    }

    /// Whether this is a contract (`cx…`) address.
    pub fn is_contract(&self) -> bool {
        self.0.starts_with(CONTRACT_PREFIX)
    }

    /// The address string as it appears on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 21-byte binary form: a kind byte (0x01 for contract, 0x00 for
    /// account) followed by the 20-byte body. This is the form event logs
    /// carry.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = hex::decode(&self.0[2..])?;
        let mut out = Vec::with_capacity(21);
        out.push(u8::from(self.is_contract()));
        out.extend_from_slice(&body);
        Ok(out)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A BTP address, `btp://<net>/<contract>`, identifying a contract on a
/// named network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BTPAddress(String);

impl BTPAddress {
    /// Wraps a `btp://net/contract` string after validating its shape.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        let rest = s
            .strip_prefix("btp://")
            .ok_or_else(|| Error::InvalidAddress(s.clone()))?;
        match rest.split_once('/') {
            Some((net, contract)) if !net.is_empty() && !contract.is_empty() => Ok(Self(s)),
            _ => Err(Error::InvalidAddress(s)),
        }
    }

    /// The network segment, e.g. `0x1.icon`.
    pub fn net(&self) -> &str {
        self.rest().split_once('/').map(|(net, _)| net).unwrap_or("")
    }

    /// The contract segment.
    pub fn contract_address(&self) -> &str {
        self.rest()
            .split_once('/')
            .map(|(_, contract)| contract)
            .unwrap_or("")
    }

    /// The full address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn rest(&self) -> &str {
        self.0.strip_prefix("btp://").unwrap_or("")
    }
}

impl std::fmt::Display for BTPAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
