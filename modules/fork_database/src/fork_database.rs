//! DPoS fork database.
//!
//! Holds every known block that is not yet irreversible, tracks the head,
//! reconciles competing branches and hands irreversible blocks to an
//! observer as they are pruned.

pub mod block_header_state;
pub mod block_state;
pub mod fork_error;
pub mod fork_index;
pub mod fork_observer;

#[cfg(test)]
mod test_chain;

use std::collections::VecDeque;

use dpos_common::{BlockId, ForkDatabaseConfig, HeaderConfirmation, SignedBlock};
use tracing::{debug, info, warn};

pub use block_header_state::BlockHeaderState;
pub use block_state::BlockState;
pub use fork_error::ForkDatabaseError;
pub use fork_index::{BlockHandle, ForkIndex};
pub use fork_observer::{ForkDatabaseObserver, NoOpObserver};

/// The two divergent segments of a pair of blocks, each ordered from the
/// tip down to the block just above the common ancestor.
#[derive(Debug, Default)]
pub struct Branches<'a> {
    pub first: Vec<&'a BlockState>,
    pub second: Vec<&'a BlockState>,
}

pub struct ForkDatabase {
    index: ForkIndex,
    /// Highest block added so far.
    head: Option<BlockHandle>,
    config: ForkDatabaseConfig,
    observer: Box<dyn ForkDatabaseObserver + Send>,
}

impl ForkDatabase {
    pub fn new(config: ForkDatabaseConfig, observer: Box<dyn ForkDatabaseObserver + Send>) -> Self {
        Self {
            index: ForkIndex::new(),
            head: None,
            config,
            observer,
        }
    }

    pub fn config(&self) -> &ForkDatabaseConfig {
        &self.config
    }

    /// Seed the database with a trusted state, such as genesis or the last
    /// irreversible block of a snapshot.
    pub fn set_root(&mut self, state: BlockState) -> Result<(), ForkDatabaseError> {
        let handle = self.index.insert(state)?;
        self.advance_head(handle);
        Ok(())
    }

    /// Insert an already validated block.
    ///
    /// With auto-pruning on, the oldest ancestor of the head is pruned once
    /// it falls below the head's irreversible block; if that drops the new
    /// block itself the result is `NotFound`.
    pub fn add(&mut self, state: BlockState) -> Result<&BlockState, ForkDatabaseError> {
        let id = state.id();
        let handle = self.index.insert(state)?;
        self.advance_head(handle);

        if self.config.auto_prune {
            self.auto_prune()?;
        }

        self.index.get_by_id(&id).ok_or(ForkDatabaseError::NotFound { id })
    }

    /// Validate a received block against its parent and insert it.
    pub fn add_signed_block(
        &mut self,
        block: SignedBlock,
        trust: bool,
    ) -> Result<&BlockState, ForkDatabaseError> {
        let id = block.block_id();
        if self.index.find_by_id(&id).is_some() {
            return Err(ForkDatabaseError::Duplicate { id });
        }

        let previous = block.header().previous;
        let prior = self
            .index
            .get_by_id(&previous)
            .ok_or(ForkDatabaseError::UnlinkableBlock { block: id, previous })?;

        let state = BlockState::from_signed_block(&prior.header_state, block, trust)?;
        self.add(state)
    }

    /// Record a producer's confirmation of a block; a quorum of the active
    /// schedule makes the block BFT irreversible.
    pub fn add_confirmation(&mut self, conf: HeaderConfirmation) -> Result<(), ForkDatabaseError> {
        let id = conf.block_id;
        let producer = conf.producer;
        let handle = self.index.find_by_id(&id).ok_or(ForkDatabaseError::NotFound { id })?;

        self.index
            .modify(handle, |state| state.header_state.add_confirmation(conf))
            .ok_or(ForkDatabaseError::NotFound { id })??;

        let state = self.index.get(handle).ok_or(ForkDatabaseError::NotFound { id })?;
        let quorum = state.header_state.active_schedule.len() * 2 / 3 + 1;
        let confirmations = state.header_state.confirmations.len();
        debug!(%id, %producer, confirmations, quorum, "Added confirmation");

        if self.config.bft_auto_irreversible
            && confirmations >= quorum
            && state.bft_irreversible_block_num() < state.block_num()
        {
            self.set_bft_irreversible(&id)?;
        }
        Ok(())
    }

    pub fn head(&self) -> Option<&BlockState> {
        self.head.and_then(|handle| self.index.get(handle))
    }

    pub fn get_block_by_id(&self, id: &BlockId) -> Option<&BlockState> {
        self.index.get_by_id(id)
    }

    /// A block at height `block_num`, preferring the current chain.
    pub fn get_block_by_num(&self, block_num: u32) -> Option<&BlockState> {
        self.blocks_at(block_num).next()
    }

    pub fn get_block_in_current_chain_by_num(&self, block_num: u32) -> Option<&BlockState> {
        self.get_block_by_num(block_num).filter(|state| state.in_current_chain)
    }

    /// Walk two blocks back to their common ancestor.
    ///
    /// When one block is an ancestor of the other its segment is empty.
    pub fn fetch_branch_from(
        &self,
        first: &BlockId,
        second: &BlockId,
    ) -> Result<Branches<'_>, ForkDatabaseError> {
        let mut a = self.lookup(first)?;
        let mut b = self.lookup(second)?;
        let mut branches = Branches::default();

        while a.block_num() > b.block_num() {
            branches.first.push(a);
            a = self.lookup(&a.previous())?;
        }
        while b.block_num() > a.block_num() {
            branches.second.push(b);
            b = self.lookup(&b.previous())?;
        }

        if a.id() != b.id() {
            while a.previous() != b.previous() {
                branches.first.push(a);
                branches.second.push(b);
                a = self.lookup(&a.previous())?;
                b = self.lookup(&b.previous())?;
            }
            branches.first.push(a);
            branches.second.push(b);
        }

        Ok(branches)
    }

    /// Mark a block as applied, or drop it and everything built on it.
    pub fn set_validity(&mut self, id: &BlockId, valid: bool) -> Result<(), ForkDatabaseError> {
        if valid {
            let handle = self.find(id)?;
            self.index.modify(handle, |state| state.validated = true);
            return Ok(());
        }

        warn!(%id, "Removing invalid block and its descendants");
        self.remove(id)
    }

    /// Remove a block together with its subtree.
    pub fn remove(&mut self, id: &BlockId) -> Result<(), ForkDatabaseError> {
        self.find(id)?;

        let mut stack = vec![*id];
        while let Some(current) = stack.pop() {
            stack.extend(
                self.index.children_of(&current).filter_map(|h| self.index.get(h)).map(BlockState::id),
            );
            if let Some(handle) = self.index.find_by_id(&current) {
                self.index.erase(handle);
                debug!(id = %current, "Removed block");
                self.observer.block_removed(current);
            }
        }

        self.refresh_head();
        Ok(())
    }

    pub fn mark_in_current_chain(
        &mut self,
        id: &BlockId,
        in_current_chain: bool,
    ) -> Result<(), ForkDatabaseError> {
        let handle = self.find(id)?;
        let unchanged =
            self.index.get(handle).is_some_and(|state| state.in_current_chain == in_current_chain);
        if !unchanged {
            self.index.modify(handle, |state| state.in_current_chain = in_current_chain);
        }
        Ok(())
    }

    /// Make a block and its ancestors irreversible.
    ///
    /// Ancestors are handed to the observer oldest first and leave the
    /// database, competing blocks at their heights are removed with their
    /// subtrees, as is anything else below the block. Descendants of the
    /// block stay. Nothing changes if that would drop a block marked as in
    /// the current chain.
    pub fn prune(&mut self, id: &BlockId) -> Result<(), ForkDatabaseError> {
        let target = self.lookup(id)?;
        let block_num = target.block_num();

        let mut lineage = vec![target.id()];
        let mut previous = target.previous();
        while let Some(parent) = self.index.get_by_id(&previous) {
            lineage.push(parent.id());
            previous = parent.previous();
        }

        let current = self
            .index
            .from_block_num(0)
            .filter_map(|h| self.index.get(h))
            .take_while(|state| state.block_num() <= block_num)
            .find(|state| state.in_current_chain && !lineage.contains(&state.id()));
        if let Some(current) = current {
            return Err(ForkDatabaseError::ConflictsWithCurrentChain {
                id: *id,
                current: current.id(),
            });
        }

        for ancestor in lineage.into_iter().rev() {
            let Some(handle) = self.index.find_by_id(&ancestor) else {
                continue;
            };
            let Some(state) = self.index.get(handle) else {
                continue;
            };

            let competitors: Vec<BlockId> = self
                .blocks_at(state.block_num())
                .map(BlockState::id)
                .filter(|competitor| *competitor != ancestor)
                .collect();
            for competitor in competitors {
                self.remove(&competitor)?;
            }

            if let Some(state) = self.index.get(handle) {
                info!(block_num = state.block_num(), id = %ancestor, "Block irreversible");
                self.observer.irreversible(state);
            }
            self.index.erase(handle);
        }

        let stale: Vec<BlockId> = self
            .index
            .from_block_num(0)
            .filter_map(|h| self.index.get(h))
            .take_while(|state| state.block_num() < block_num)
            .map(BlockState::id)
            .collect();
        for id in stale {
            if self.index.find_by_id(&id).is_some() {
                self.remove(&id)?;
            }
        }

        self.refresh_head();
        Ok(())
    }

    /// Mark a block BFT irreversible and raise its descendants to it.
    pub fn set_bft_irreversible(&mut self, id: &BlockId) -> Result<(), ForkDatabaseError> {
        let handle = self.find(id)?;
        let block_num = self
            .index
            .modify(handle, |state| {
                state.header_state.bft_irreversible_block_num = state.block_num();
                state.block_num()
            })
            .ok_or(ForkDatabaseError::NotFound { id: *id })?;

        // Stop at children already at or above the mark
        let mut queue = VecDeque::from([*id]);
        let mut raised = 0usize;
        while let Some(parent) = queue.pop_front() {
            let children: Vec<BlockHandle> = self
                .index
                .children_of(&parent)
                .filter(|h| {
                    self.index.get(*h).is_some_and(|s| s.bft_irreversible_block_num() < block_num)
                })
                .collect();
            for child in children {
                let child_id = self.index.modify(child, |state| {
                    state.header_state.bft_irreversible_block_num = block_num;
                    state.id()
                });
                if let Some(child_id) = child_id {
                    raised += 1;
                    queue.push_back(child_id);
                }
            }
        }

        info!(block_num, %id, raised, "Block BFT irreversible");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn find(&self, id: &BlockId) -> Result<BlockHandle, ForkDatabaseError> {
        self.index.find_by_id(id).ok_or(ForkDatabaseError::NotFound { id: *id })
    }

    fn lookup(&self, id: &BlockId) -> Result<&BlockState, ForkDatabaseError> {
        self.index.get_by_id(id).ok_or(ForkDatabaseError::NotFound { id: *id })
    }

    /// Blocks at exactly `block_num`, current chain first.
    fn blocks_at(&self, block_num: u32) -> impl Iterator<Item = &BlockState> + '_ {
        self.index
            .from_block_num(block_num)
            .filter_map(|h| self.index.get(h))
            .take_while(move |state| state.block_num() == block_num)
    }

    fn advance_head(&mut self, handle: BlockHandle) {
        let Some(state) = self.index.get(handle) else {
            return;
        };
        if self.head().is_some_and(|head| head.block_num() >= state.block_num()) {
            return;
        }
        info!(block_num = state.block_num(), id = %state.id(), "New head");
        self.head = Some(handle);
    }

    /// Fall back to the best irreversibility candidate if the head left.
    fn refresh_head(&mut self) {
        if self.head().is_some() {
            return;
        }
        self.head = self.index.best_irreversible();
        if let Some(head) = self.head() {
            info!(block_num = head.block_num(), id = %head.id(), "Head reset");
        }
    }

    /// Prune the lowest ancestor of the head once it falls below the
    /// head's irreversible block.
    fn auto_prune(&mut self) -> Result<(), ForkDatabaseError> {
        let Some(head) = self.head() else {
            return Ok(());
        };
        let lib = head.dpos_irreversible_block_num();
        let mut oldest = head;
        while let Some(parent) = self.index.get_by_id(&oldest.previous()) {
            oldest = parent;
        }
        if oldest.block_num() >= lib {
            return Ok(());
        }

        let id = oldest.id();
        match self.prune(&id) {
            Err(ForkDatabaseError::ConflictsWithCurrentChain { id, current }) => {
                warn!(%id, %current, "Skipped auto-prune off the current chain");
                Ok(())
            }
            result => result,
        }
    }
}
