//! Hashing, canonical encoding and compact recoverable signatures

use crate::{CoreError, CoreResult, Hash, KeyId};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Size of a serialized compact signature (r || s || recovery id)
pub const COMPACT_SIGNATURE_SIZE: usize = 65;

/// Keccak-256 of arbitrary bytes
pub fn keccak256(data: &[u8]) -> Hash {
    let digest = Keccak256::digest(data);
    Hash::from_slice(digest.as_slice())
}

/// Canonical binary encoding used for hashing, relaying and storage
pub fn encode<T: bincode::Encode>(value: &T) -> CoreResult<Vec<u8>> {
    Ok(bincode::encode_to_vec(value, bincode::config::standard())?)
}

/// Inverse of [`encode`]
pub fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> CoreResult<T> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(value)
}

/// Keccak-256 of the canonical encoding of `value`
pub fn hash_encoded<T: bincode::Encode>(value: &T) -> CoreResult<Hash> {
    Ok(keccak256(&encode(value)?))
}

/// Compact recoverable signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct CompactSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl CompactSignature {
    /// Create new signature
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// Convert to bytes (65 bytes total)
    pub fn to_bytes(&self) -> [u8; COMPACT_SIGNATURE_SIZE] {
        let mut bytes = [0u8; COMPACT_SIGNATURE_SIZE];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != COMPACT_SIGNATURE_SIZE || bytes[64] > 3 {
            return Err(CoreError::InvalidSignature);
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);

        Ok(Self { r, s, v: bytes[64] })
    }
}

/// Derive the key id of a public key (last 20 bytes of Keccak-256 of the
/// uncompressed key without its 0x04 prefix)
pub fn key_id_of(public_key: &PublicKey) -> KeyId {
    let pubkey_bytes = public_key.serialize_uncompressed();
    let pubkey_hash = keccak256(&pubkey_bytes[1..]);
    KeyId::from_slice(&pubkey_hash.as_bytes()[12..32])
}

/// Recover the public key that produced `signature` over `hash`.
///
/// Only the low-s form is accepted, so each message has a single valid
/// signature encoding per signer.
pub fn recover_compact(hash: &Hash, signature: &[u8]) -> CoreResult<PublicKey> {
    let signature = CompactSignature::from_bytes(signature)?;
    let secp = Secp256k1::new();

    let recovery_id = RecoveryId::from_u8_masked(signature.v);

    let mut sig_bytes = [0u8; 64];
    sig_bytes[0..32].copy_from_slice(&signature.r);
    sig_bytes[32..64].copy_from_slice(&signature.s);

    let recoverable_sig = RecoverableSignature::from_compact(&sig_bytes, recovery_id)
        .map_err(|e| CoreError::Crypto(e.to_string()))?;

    let standard = recoverable_sig.to_standard();
    let mut normalized = standard;
    normalized.normalize_s();
    if normalized != standard {
        return Err(CoreError::InvalidSignature);
    }

    let message = Message::from_digest(*hash.as_bytes());

    secp.recover_ecdsa(message, &recoverable_sig)
        .map_err(|e| CoreError::Crypto(e.to_string()))
}

/// Recover the key id that produced `signature` over `hash`
pub fn recover_key_id(hash: &Hash, signature: &[u8]) -> CoreResult<KeyId> {
    recover_compact(hash, signature).map(|public_key| key_id_of(&public_key))
}

/// A masternode operator's secp256k1 signing key
#[derive(Clone)]
pub struct SigningKey {
    secret: SecretKey,
    public: PublicKey,
}

impl SigningKey {
    /// Load from 32 raw secret bytes
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let secp = Secp256k1::new();
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        let secret =
            SecretKey::from_byte_array(bytes).map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self { secret, public })
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn key_id(&self) -> KeyId {
        key_id_of(&self.public)
    }

    /// Sign a 32-byte digest, producing a 65-byte compact signature
    pub fn sign_compact(&self, hash: &Hash) -> CoreResult<Vec<u8>> {
        let secp = Secp256k1::new();
        let message = Message::from_digest(*hash.as_bytes());

        let sig = secp.sign_ecdsa_recoverable(message, &self.secret);
        let (recovery_id, sig_bytes) = sig.serialize_compact();

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&sig_bytes[0..32]);
        s.copy_from_slice(&sig_bytes[32..64]);
        let v = i32::from(recovery_id) as u8;

        Ok(CompactSignature::new(r, s, v).to_bytes().to_vec())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(byte: u8) -> SigningKey {
        SigningKey::from_bytes(&[byte; 32]).unwrap()
    }

    #[test]
    fn test_sign_and_recover() {
        let key = test_key(7);
        let hash = keccak256(b"round vote");

        let signature = key.sign_compact(&hash).unwrap();
        assert_eq!(signature.len(), COMPACT_SIGNATURE_SIZE);

        let recovered = recover_key_id(&hash, &signature).unwrap();
        assert_eq!(recovered, key.key_id());
    }

    #[test]
    fn test_recover_over_other_hash_yields_other_key() {
        let key = test_key(7);
        let signature = key.sign_compact(&keccak256(b"signed")).unwrap();

        match recover_key_id(&keccak256(b"tampered"), &signature) {
            Ok(recovered) => assert_ne!(recovered, key.key_id()),
            Err(_) => {}
        }
    }

    #[test]
    fn test_malformed_signature_rejected() {
        let hash = keccak256(b"payload");
        assert!(recover_compact(&hash, &[]).is_err());
        assert!(recover_compact(&hash, &[0u8; 64]).is_err());

        let mut bad_recovery_id = [1u8; COMPACT_SIGNATURE_SIZE];
        bad_recovery_id[64] = 9;
        assert!(recover_compact(&hash, &bad_recovery_id).is_err());
    }

    /// Same signature with s replaced by n - s and the recovery parity flipped
    fn high_s_twin(signature: &[u8]) -> Vec<u8> {
        const ORDER: [u8; 32] = [
            0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
            0xFF, 0xFE, 0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C,
            0xD0, 0x36, 0x41, 0x41,
        ];
        let mut twin = signature.to_vec();
        let mut borrow = 0i16;
        for i in (0..32).rev() {
            let diff = ORDER[i] as i16 - signature[32 + i] as i16 - borrow;
            borrow = i16::from(diff < 0);
            twin[32 + i] = diff.rem_euclid(256) as u8;
        }
        twin[64] ^= 1;
        twin
    }

    #[test]
    fn test_high_s_twin_rejected() {
        let key = test_key(7);
        let hash = keccak256(b"round vote");
        let signature = key.sign_compact(&hash).unwrap();

        let twin = high_s_twin(&signature);
        assert_ne!(twin, signature);
        assert!(matches!(
            recover_compact(&hash, &twin),
            Err(CoreError::InvalidSignature)
        ));
        assert_eq!(recover_key_id(&hash, &signature).unwrap(), key.key_id());
    }

    #[test]
    fn test_invalid_secret_rejected() {
        assert!(SigningKey::from_bytes(&[0u8; 32]).is_err());
        assert!(SigningKey::from_bytes(&[1u8; 31]).is_err());
    }

    #[test]
    fn test_distinct_keys_have_distinct_ids() {
        assert_ne!(test_key(1).key_id(), test_key(2).key_id());
    }
}
