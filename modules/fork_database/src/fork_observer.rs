//! Observer trait for fork database events.

use dpos_common::BlockId;

use crate::block_state::BlockState;

/// Callback receiver for fork database events.
///
/// The controller implements this trait to apply irreversible blocks to
/// permanent storage and to forget about removed ones.
pub trait ForkDatabaseObserver {
    /// A block became irreversible and is about to leave the database.
    ///
    /// Called oldest first, in ascending block number order.
    fn irreversible(&self, block: &BlockState);

    /// A block was dropped, either invalid or on a dead fork.
    fn block_removed(&self, id: BlockId);
}

/// Observer that ignores every event.
pub struct NoOpObserver;

impl ForkDatabaseObserver for NoOpObserver {
    fn irreversible(&self, _: &BlockState) {}
    fn block_removed(&self, _: BlockId) {}
}
