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

//! Transaction signing and commit-vote signer recovery over secp256k1.

use btp_relayer_types::{sha3_256, Address, ValidatorAddr};
use btp_relayer_utils::{Error, Result};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// Anything able to produce recoverable signatures for transactions.
pub trait Wallet: Send + Sync {
    /// Signs a 32-byte digest, returning the 65-byte `r || s || v` form.
    fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>>;
    /// The account address derived from the signing key.
    fn address(&self) -> &Address;
}

/// A wallet over an in-memory secp256k1 secret key.
pub struct KeyWallet {
    key: SigningKey,
    address: Address,
}

impl KeyWallet {
    /// Builds a wallet from 32 secret-key bytes.
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(secret)?;
        let address = Address::account_from_body(&public_key_to_body(key.verifying_key()));
        Ok(Self { key, address })
    }
}

impl Wallet for KeyWallet {
    fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>> {
        let (signature, recovery_id) = self.key.sign_prehash_recoverable(digest)?;
        let mut out = signature.to_bytes().to_vec();
        out.push(recovery_id.to_byte());
        Ok(out)
    }

    fn address(&self) -> &Address {
        &self.address
    }
}

/// Recovers the 20-byte address body of whoever signed `digest` with the
/// 65-byte recoverable signature `sig`.
pub fn recover_signer(digest: &[u8; 32], sig: &[u8]) -> Result<ValidatorAddr> {
    if sig.len() != 65 {
        return Err(Error::Signature(k256::ecdsa::Error::new()));
    }
    let signature = Signature::from_slice(&sig[..64])?;
    let recovery_id =
        RecoveryId::from_byte(sig[64]).ok_or_else(|| Error::Signature(k256::ecdsa::Error::new()))?;
    let verifying_key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)?;
    Ok(public_key_to_body(&verifying_key))
}

/// The address body: the last 20 bytes of SHA3-256 over the uncompressed
/// public key without its tag byte.
fn public_key_to_body(key: &VerifyingKey) -> ValidatorAddr {
    let point = key.to_encoded_point(false);
    let hash = sha3_256(&point.as_bytes()[1..]);
    let mut body = [0u8; 20];
    body.copy_from_slice(&hash[12..]);
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: [u8; 32] = [0x11; 32];

    #[test]
    fn sign_is_recoverable() {
        let wallet = KeyWallet::from_secret_bytes(&SECRET).unwrap();
        let digest = sha3_256(b"payload");
        let sig = wallet.sign(&digest).unwrap();
        assert_eq!(sig.len(), 65);

        let body = recover_signer(&digest, &sig).unwrap();
        assert_eq!(wallet.address(), &Address::account_from_body(&body));
    }

    #[test]
    fn sign_is_deterministic() {
        // RFC 6979 nonces: same key, same digest, same signature.
        let wallet = KeyWallet::from_secret_bytes(&SECRET).unwrap();
        let digest = sha3_256(b"payload");
        assert_eq!(wallet.sign(&digest).unwrap(), wallet.sign(&digest).unwrap());
    }

    #[test]
    fn recovery_rejects_malformed_signatures() {
        let digest = sha3_256(b"payload");
        assert!(recover_signer(&digest, &[0u8; 10]).is_err());
        assert!(recover_signer(&digest, &[0u8; 65]).is_err());
    }

    #[test]
    fn tampered_digest_recovers_different_signer() {
        let wallet = KeyWallet::from_secret_bytes(&SECRET).unwrap();
        let digest = sha3_256(b"payload");
        let sig = wallet.sign(&digest).unwrap();
        let other = sha3_256(b"other payload");
        match recover_signer(&other, &sig) {
            Ok(body) => assert_ne!(&Address::account_from_body(&body), wallet.address()),
            Err(_) => {} // some malleated inputs simply fail to recover
        }
    }
}
