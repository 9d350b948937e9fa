//! Signed test chains built from deterministic producer keys.

use dpos_common::{BlockTimestamp, Digest, SignedBlock};
use dpos_test_utils::{chain_id, genesis_timestamp, producer_key, producer_schedule};

use crate::block_header_state::BlockHeaderState;
use crate::block_state::BlockState;

/// Genesis state whose initial schedule holds `producers`.
pub(crate) fn genesis(producers: &[&str]) -> BlockHeaderState {
    BlockHeaderState::genesis(genesis_timestamp(), producer_schedule(0, producers), chain_id())
}

/// Block produced at the next slot, confirming nothing before it.
pub(crate) fn produce(prior: &BlockHeaderState) -> BlockHeaderState {
    produce_with(prior, None, 0)
}

/// Block produced at `when`, confirming `confirmed` prior blocks.
pub(crate) fn produce_with(
    prior: &BlockHeaderState,
    when: Option<BlockTimestamp>,
    confirmed: u16,
) -> BlockHeaderState {
    let mut next = prior.generate_next(when).unwrap();
    next.set_confirmed(confirmed);
    next.maybe_promote_pending();
    next.finalize(Digest::default(), Digest::default());
    let key = producer_key(next.producer());
    next.sign(|digest| key.sign(digest)).unwrap();
    next
}

/// Block state wrapping `header_state` with an empty body.
pub(crate) fn block_state(header_state: BlockHeaderState) -> BlockState {
    let block = SignedBlock::new(header_state.header.clone());
    BlockState::new(header_state, block)
}

/// `count` blocks built on `prior`, one slot apart, oldest first.
pub(crate) fn extend(prior: &BlockHeaderState, count: usize) -> Vec<BlockHeaderState> {
    let mut chain: Vec<BlockHeaderState> = Vec::with_capacity(count);
    for _ in 0..count {
        let next = produce(chain.last().unwrap_or(prior));
        chain.push(next);
    }
    chain
}

/// A block on top of `prior` that differs from `produce(prior)` by skipping
/// `skip` slots, so it starts a competing branch.
pub(crate) fn fork(prior: &BlockHeaderState, skip: u32) -> BlockHeaderState {
    let when = BlockTimestamp::new(prior.timestamp().slot() + 1 + skip);
    produce_with(prior, Some(when), 0)
}
