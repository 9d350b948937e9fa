//! Error types for block header validation and fork database operations.

use dpos_common::{AccountName, BlockId, CryptoError, PublicKey};

/// Errors returned while validating headers or updating the
/// [`ForkDatabase`](crate::ForkDatabase).
///
/// Every variant is fatal to the block being evaluated; the caller decides
/// what to do with the block and the peer that sent it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForkDatabaseError {
    /// Malformed or out-of-order header.
    #[error("block validation failed: {0}")]
    BlockValidate(String),

    /// The block does not link to the block it names as previous.
    #[error("unlinkable block {block}: previous {previous} is not known")]
    UnlinkableBlock { block: BlockId, previous: BlockId },

    /// The block was produced outside the producer's slot.
    #[error("wrong producer: expected {expected}, got {got}")]
    WrongProducer {
        expected: AccountName,
        got: AccountName,
    },

    #[error("producer schedule error: {0}")]
    ProducerSchedule(String),

    /// The producer confirmed a range it already confirmed.
    #[error("producer {producer} double confirmed at block {block_num}")]
    ProducerDoubleConfirm {
        producer: AccountName,
        block_num: u32,
    },

    #[error("producer {producer} is not in the active schedule")]
    ProducerNotInSchedule { producer: AccountName },

    /// The signature does not recover to the scheduled signing key.
    #[error("wrong signing key: expected {expected}, got {got}")]
    WrongSigningKey {
        expected: PublicKey,
        got: PublicKey,
    },

    /// The signature is missing or does not verify against its own key.
    #[error("bad signature: {0}")]
    Signature(#[from] CryptoError),

    /// Pruning the block would drop a block of the current chain.
    #[error("pruning block {id} would drop current chain block {current}")]
    ConflictsWithCurrentChain { id: BlockId, current: BlockId },

    #[error("block {id} already exists")]
    Duplicate { id: BlockId },

    #[error("block {id} not found")]
    NotFound { id: BlockId },
}
