//! Signer identity resolution
//!
//! Every vote and heartbeat is anonymous on the wire. The voter identity is
//! derived here: recover the signing key, check it belonged to the team at
//! the height of the referenced tip, then map it to a masternode.

use crate::traits::{ChainView, MasternodeRegistry, Wallet};
use dpos_core::crypto::recover_key_id;
use dpos_core::{Hash, KeyId, MasternodeId, SignedVote, SigningKey};
use std::sync::Arc;
use tracing::debug;

/// Resolves signers of consensus messages to masternodes
pub struct IdentityResolver {
    chain: Arc<dyn ChainView>,
    registry: Arc<dyn MasternodeRegistry>,
    wallet: Arc<dyn Wallet>,
    /// Blocks below the chain head a tip may be
    team_lookback: u64,
}

impl IdentityResolver {
    pub fn new(
        chain: Arc<dyn ChainView>,
        registry: Arc<dyn MasternodeRegistry>,
        wallet: Arc<dyn Wallet>,
        team_lookback: u64,
    ) -> Self {
        Self {
            chain,
            registry,
            wallet,
            team_lookback,
        }
    }

    /// Key id that signed `hash`, if the signature is well formed
    pub fn recover_signer(hash: &Hash, signature: &[u8]) -> Option<KeyId> {
        recover_key_id(hash, signature).ok()
    }

    /// Whether `key` was a team member at the height of `tip`.
    ///
    /// The tip must be on the active chain within `team_lookback` blocks of
    /// the head; the genesis block counts.
    pub fn is_team_member_at(&self, tip: &Hash, key: &KeyId) -> bool {
        let head = self.chain.tip_height();
        let lowest = head.saturating_sub(self.team_lookback);

        for height in (lowest..=head).rev() {
            if self.chain.block_hash_at(height).as_ref() == Some(tip) {
                return self.registry.is_team_member(height, key);
            }
        }

        debug!("Tip {} not found within {} blocks of head", tip, self.team_lookback);
        false
    }

    /// Masternode operated by `key`; `None` resolves this node's own operator
    pub fn resolve_masternode_id(&self, key: Option<&KeyId>) -> Option<MasternodeId> {
        match key {
            Some(key) => self.registry.find_by_operator(key),
            None => {
                let operator = self.registry.local_operator()?;
                self.wallet.get_key(&operator)?;
                self.registry.find_by_operator(&operator)
            }
        }
    }

    /// Authenticated author of a vote, or `None` if it cannot be trusted
    pub fn extract_masternode_id<V: SignedVote>(&self, vote: &V) -> Option<MasternodeId> {
        let hash = vote.signature_hash().ok()?;
        let Some(key) = Self::recover_signer(&hash, vote.signature()) else {
            debug!("Unrecoverable vote signature");
            return None;
        };

        if !self.is_team_member_at(&vote.tip(), &key) {
            debug!("Signer {} is not a team member at tip {}", key, vote.tip());
            return None;
        }

        self.resolve_masternode_id(Some(&key))
    }

    /// This node's operator key, when it runs an active masternode
    pub fn masternode_key(&self) -> Option<SigningKey> {
        let operator = self.registry.local_operator()?;
        self.wallet.get_key(&operator)
    }
}
