//! A block as held by the fork database.

use dpos_common::{BlockId, SignedBlock, TransactionMetadata};
use serde::{Deserialize, Serialize};

use crate::block_header_state::BlockHeaderState;
use crate::fork_error::ForkDatabaseError;

/// Header state plus the signed block and the controller's flags.
///
/// Fields that order the fork index (`validated` aside) are only changed
/// through [`ForkIndex::modify`](crate::fork_index::ForkIndex::modify).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockState {
    pub header_state: BlockHeaderState,
    pub block: SignedBlock,
    /// The block body has been applied successfully.
    pub validated: bool,
    pub in_current_chain: bool,
    pub transactions: Vec<TransactionMetadata>,
}

impl BlockState {
    pub fn new(header_state: BlockHeaderState, block: SignedBlock) -> Self {
        Self {
            header_state,
            block,
            validated: false,
            in_current_chain: false,
            transactions: Vec::new(),
        }
    }

    /// Validate a received block against its parent's state.
    pub fn from_signed_block(
        prior: &BlockHeaderState,
        block: SignedBlock,
        trust: bool,
    ) -> Result<Self, ForkDatabaseError> {
        let header_state = prior.next(&block.signed_header, trust)?;
        Ok(Self::new(header_state, block))
    }

    pub fn id(&self) -> BlockId {
        self.header_state.block_id
    }

    pub fn block_num(&self) -> u32 {
        self.header_state.block_num
    }

    pub fn previous(&self) -> BlockId {
        self.header_state.previous()
    }

    pub fn dpos_irreversible_block_num(&self) -> u32 {
        self.header_state.dpos_irreversible_block_num
    }

    pub fn bft_irreversible_block_num(&self) -> u32 {
        self.header_state.bft_irreversible_block_num
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_chain::{genesis, produce};

    #[test]
    fn test_from_signed_block_runs_header_transition() {
        let prior = genesis(&["eosio", "p2", "p3"]);
        let produced = produce(&prior);
        let block = SignedBlock::new(produced.header.clone());

        let state = BlockState::from_signed_block(&prior, block, false).unwrap();
        assert_eq!(state.header_state, produced);
        assert_eq!(state.id(), state.block.block_id());
        assert_eq!(state.block_num(), 2);
        assert_eq!(state.previous(), prior.block_id);
        assert!(!state.validated);
        assert!(!state.in_current_chain);
    }

    #[test]
    fn test_from_signed_block_rejects_foreign_parent() {
        let prior = genesis(&["eosio"]);
        let block_two = produce(&prior);
        let block_three = produce(&block_two);

        let result = BlockState::from_signed_block(
            &prior,
            SignedBlock::new(block_three.header.clone()),
            false,
        );
        assert_eq!(
            result,
            Err(ForkDatabaseError::UnlinkableBlock {
                block: block_three.block_id,
                previous: block_two.block_id,
            })
        );
    }
}
