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

//! `0x`-prefixed scalar strings used across the source-chain JSON-RPC API.
//!
//! Both types keep the wire string verbatim so that a decode/encode
//! round-trip is byte-exact, and only interpret it on demand.

use btp_relayer_utils::{Error, Result};
use num_bigint::{BigInt, BigUint, Sign};
use serde::{Deserialize, Serialize};

/// A `0x`-prefixed, arbitrary-precision hexadecimal integer.
///
/// Negative values carry a leading minus sign (`-0x1a`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexInt(String);

impl HexInt {
    /// Encodes a non-negative integer as its minimal lowercase hex form.
    pub fn from_u64(v: u64) -> Self {
        Self(format!("0x{v:x}"))
    }

    /// Encodes a signed integer.
    pub fn from_i64(v: i64) -> Self {
        if v < 0 {
            Self(format!("-0x{:x}", v.unsigned_abs()))
        } else {
            Self(format!("0x{v:x}"))
        }
    }

    /// Encodes a big-endian magnitude as a non-negative integer.
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        let v = BigUint::from_bytes_be(bytes);
        Self(format!("0x{v:x}"))
    }

    /// The wire string, e.g. `0x2a`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes to an arbitrary-precision integer.
    pub fn value(&self) -> Result<BigInt> {
        let (sign, rest) = match self.0.strip_prefix('-') {
            Some(rest) => (Sign::Minus, rest),
            None => (Sign::Plus, self.0.as_str()),
        };
        let digits = rest
            .strip_prefix("0x")
            .ok_or_else(|| Error::InvalidHex(self.0.clone()))?;
        let mag = BigUint::parse_bytes(digits.as_bytes(), 16)
            .ok_or_else(|| Error::InvalidHex(self.0.clone()))?;
        Ok(BigInt::from_biguint(if mag == BigUint::from(0u8) { Sign::NoSign } else { sign }, mag))
    }

    /// Decodes to a `u64`, rejecting negative or oversized values.
    pub fn to_u64(&self) -> Result<u64> {
        let digits = self
            .0
            .strip_prefix("0x")
            .ok_or_else(|| Error::InvalidHex(self.0.clone()))?;
        u64::from_str_radix(digits, 16).map_err(|_| Error::InvalidHex(self.0.clone()))
    }

    /// Decodes to an `i64`.
    pub fn to_i64(&self) -> Result<i64> {
        match self.0.strip_prefix('-') {
            Some(_) => {
                let v = self.value()?;
                i64::try_from(v).map_err(|_| Error::InvalidHex(self.0.clone()))
            }
            None => self.to_u64().and_then(|v| {
                i64::try_from(v).map_err(|_| Error::InvalidHex(self.0.clone()))
            }),
        }
    }
}

impl std::fmt::Display for HexInt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for HexInt {
    fn from(v: u64) -> Self {
        Self::from_u64(v)
    }
}

/// A `0x`-prefixed hexadecimal byte string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexBytes(String);

impl HexBytes {
    /// Encodes a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// The wire string, e.g. `0xdeadbeef`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes to raw bytes. An empty string decodes to an empty vector.
    pub fn value(&self) -> Result<Vec<u8>> {
        if self.0.is_empty() {
            return Ok(Vec::new());
        }
        let digits = self
            .0
            .strip_prefix("0x")
            .ok_or_else(|| Error::InvalidHex(self.0.clone()))?;
        Ok(hex::decode(digits)?)
    }
}

impl std::fmt::Display for HexBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&[u8]> for HexBytes {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}
