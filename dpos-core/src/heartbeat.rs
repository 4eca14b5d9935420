//! Signed masternode liveness beacon

use crate::crypto::{hash_encoded, recover_key_id, SigningKey};
use crate::{CoreError, CoreResult, Hash, KeyId, Timestamp};
use serde::{Deserialize, Serialize};

/// Domain separation salt for heartbeat signatures
pub const HEARTBEAT_SALT: [u8; 16] = [
    0x36, 0x4D, 0x2B, 0x44, 0x58, 0x37, 0x78, 0x39, 0x7A, 0x78, 0x5E, 0x58, 0x68, 0x7A, 0x35, 0x75,
];

/// Heartbeat message; like votes, it carries no sender field
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct HeartbeatMessage {
    /// Milliseconds since Unix epoch
    pub timestamp: Timestamp,
    pub signature: Vec<u8>,
}

impl HeartbeatMessage {
    /// Unsigned message for `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            signature: Vec::new(),
        }
    }

    /// A message without timestamp or signature carries nothing
    pub fn is_null(&self) -> bool {
        self.timestamp == 0 || self.signature.is_empty()
    }

    pub fn hash(&self) -> CoreResult<Hash> {
        hash_encoded(self)
    }

    /// Digest the signature commits to
    pub fn signature_hash(&self) -> CoreResult<Hash> {
        hash_encoded(&(self.timestamp, HEARTBEAT_SALT))
    }

    /// Sign in place; on failure the signature is left empty
    pub fn sign(&mut self, key: &SigningKey) -> CoreResult<()> {
        self.signature.clear();
        self.signature = key.sign_compact(&self.signature_hash()?)?;
        Ok(())
    }

    /// Key id of the signer
    pub fn signer(&self) -> CoreResult<KeyId> {
        if self.is_null() {
            return Err(CoreError::InvalidSignature);
        }
        recover_key_id(&self.signature_hash()?, &self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_message() {
        assert!(HeartbeatMessage::default().is_null());
        assert!(HeartbeatMessage::new(1_000).is_null());

        let mut zero_time = HeartbeatMessage::new(0);
        zero_time.signature = vec![1; 65];
        assert!(zero_time.is_null());
        assert!(zero_time.signer().is_err());
    }

    #[test]
    fn test_sign_and_recover() {
        let key = SigningKey::from_bytes(&[5; 32]).unwrap();
        let mut message = HeartbeatMessage::new(1_700_000_000_000);
        message.sign(&key).unwrap();

        assert!(!message.is_null());
        assert_eq!(message.signer().unwrap(), key.key_id());
    }

    #[test]
    fn test_hash_depends_on_timestamp() {
        let key = SigningKey::from_bytes(&[5; 32]).unwrap();
        let mut first = HeartbeatMessage::new(1_000);
        let mut second = HeartbeatMessage::new(2_000);
        first.sign(&key).unwrap();
        second.sign(&key).unwrap();

        assert_ne!(first.hash().unwrap(), second.hash().unwrap());
    }
}
