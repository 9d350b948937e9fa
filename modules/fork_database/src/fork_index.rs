//! Multi-key index over every block known to the fork database.
//!
//! Entries live in an arena addressed by generational [`BlockHandle`]s; a
//! handle to an erased entry never resolves, even after its slot is reused.
//! Besides the unique id map, three ordered views are kept in step with the
//! arena:
//!
//! - by previous id, to enumerate the children of a block;
//! - by `(block_num, in_current_chain)`, ascending with current-chain
//!   blocks first at each height;
//! - by `(dpos_irreversible, bft_irreversible, block_num)`, descending, so
//!   the first entry is the best irreversibility candidate.
//!
//! Each entry caches the keys it was filed under so erase and modify can
//! remove it from every view without searching.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use dpos_common::BlockId;
use tracing::debug;

use crate::block_state::BlockState;
use crate::fork_error::ForkDatabaseError;

/// Stable reference to an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHandle {
    slot: u32,
    generation: u32,
}

impl BlockHandle {
    const MIN: Self = Self {
        slot: 0,
        generation: 0,
    };
    const MAX: Self = Self {
        slot: u32::MAX,
        generation: u32::MAX,
    };
}

/// Height key; at equal heights the current chain sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByBlockNumKey {
    pub block_num: u32,
    pub in_current_chain: bool,
}

impl Ord for ByBlockNumKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.block_num
            .cmp(&other.block_num)
            .then_with(|| other.in_current_chain.cmp(&self.in_current_chain))
    }
}

impl PartialOrd for ByBlockNumKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Irreversibility ranking key, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByLibKey {
    pub dpos_irreversible_block_num: u32,
    pub bft_irreversible_block_num: u32,
    pub block_num: u32,
}

impl Ord for ByLibKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (
            other.dpos_irreversible_block_num,
            other.bft_irreversible_block_num,
            other.block_num,
        )
            .cmp(&(
                self.dpos_irreversible_block_num,
                self.bft_irreversible_block_num,
                self.block_num,
            ))
    }
}

impl PartialOrd for ByLibKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Keys {
    id: BlockId,
    previous: BlockId,
    by_num: ByBlockNumKey,
    by_lib: ByLibKey,
}

impl Keys {
    fn of(state: &BlockState) -> Self {
        Self {
            id: state.id(),
            previous: state.previous(),
            by_num: ByBlockNumKey {
                block_num: state.block_num(),
                in_current_chain: state.in_current_chain,
            },
            by_lib: ByLibKey {
                dpos_irreversible_block_num: state.dpos_irreversible_block_num(),
                bft_irreversible_block_num: state.bft_irreversible_block_num(),
                block_num: state.block_num(),
            },
        }
    }
}

struct Entry {
    state: BlockState,
    keys: Keys,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// The ordered views, which depend on mutable block fields.
#[derive(Default)]
struct Views {
    by_prev: BTreeSet<(BlockId, BlockHandle)>,
    by_num: BTreeSet<(ByBlockNumKey, BlockHandle)>,
    by_lib: BTreeSet<(ByLibKey, BlockHandle)>,
}

impl Views {
    fn file(&mut self, handle: BlockHandle, keys: &Keys) {
        self.by_prev.insert((keys.previous, handle));
        self.by_num.insert((keys.by_num, handle));
        self.by_lib.insert((keys.by_lib, handle));
    }

    fn unfile(&mut self, handle: BlockHandle, keys: &Keys) {
        self.by_prev.remove(&(keys.previous, handle));
        self.by_num.remove(&(keys.by_num, handle));
        self.by_lib.remove(&(keys.by_lib, handle));
    }

    fn clear(&mut self) {
        self.by_prev.clear();
        self.by_num.clear();
        self.by_lib.clear();
    }
}

/// Number of entries in the arena and in each view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSizes {
    pub primary: usize,
    pub by_id: usize,
    pub by_prev: usize,
    pub by_block_num: usize,
    pub by_lib: usize,
}

impl ViewSizes {
    pub fn is_consistent(&self) -> bool {
        [self.by_id, self.by_prev, self.by_block_num, self.by_lib]
            .iter()
            .all(|size| *size == self.primary)
    }
}

#[derive(Default)]
pub struct ForkIndex {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
    by_id: HashMap<BlockId, BlockHandle>,
    views: Views,
}

impl ForkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block under every view.
    ///
    /// A known block id is rejected before anything is touched.
    pub fn insert(&mut self, state: BlockState) -> Result<BlockHandle, ForkDatabaseError> {
        let keys = Keys::of(&state);
        if self.by_id.contains_key(&keys.id) {
            return Err(ForkDatabaseError::Duplicate { id: keys.id });
        }

        let entry = Entry { state, keys };
        let handle = match self.free.pop() {
            Some(slot) => {
                let reused = &mut self.slots[slot as usize];
                reused.entry = Some(entry);
                BlockHandle {
                    slot,
                    generation: reused.generation,
                }
            }
            None => {
                let slot = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                BlockHandle {
                    slot,
                    generation: 0,
                }
            }
        };

        self.by_id.insert(keys.id, handle);
        self.views.file(handle, &keys);
        self.len += 1;
        debug!(id = %keys.id, block_num = keys.by_num.block_num, "Indexed block");

        self.check_views();
        Ok(handle)
    }

    pub fn find_by_id(&self, id: &BlockId) -> Option<BlockHandle> {
        self.by_id.get(id).copied()
    }

    pub fn get(&self, handle: BlockHandle) -> Option<&BlockState> {
        self.entry(handle).map(|entry| &entry.state)
    }

    pub fn get_by_id(&self, id: &BlockId) -> Option<&BlockState> {
        self.find_by_id(id).and_then(|handle| self.get(handle))
    }

    /// Remove one entry from the arena and every view. Children are left
    /// in place.
    pub fn erase(&mut self, handle: BlockHandle) -> Option<BlockState> {
        let slot = self.slots.get_mut(handle.slot as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.slot);

        self.by_id.remove(&entry.keys.id);
        self.views.unfile(handle, &entry.keys);
        self.len -= 1;

        self.check_views();
        Some(entry.state)
    }

    /// Mutate an entry in place and refile it under its new keys.
    ///
    /// # Panics
    ///
    /// If `f` changes the block id.
    pub fn modify<R>(
        &mut self,
        handle: BlockHandle,
        f: impl FnOnce(&mut BlockState) -> R,
    ) -> Option<R> {
        let entry = self
            .slots
            .get_mut(handle.slot as usize)
            .filter(|slot| slot.generation == handle.generation)?
            .entry
            .as_mut()?;

        let old = entry.keys;
        self.views.unfile(handle, &old);

        let result = f(&mut entry.state);

        let new = Keys::of(&entry.state);
        assert_eq!(new.id, old.id, "modify must not change the block id");
        entry.keys = new;
        self.views.file(handle, &new);

        self.check_views();
        Some(result)
    }

    /// Blocks whose previous block is `id`.
    pub fn children_of(&self, id: &BlockId) -> impl Iterator<Item = BlockHandle> + '_ {
        self.views
            .by_prev
            .range((*id, BlockHandle::MIN)..=(*id, BlockHandle::MAX))
            .map(|(_, handle)| *handle)
    }

    /// First block at height `block_num` or above, current chain first.
    pub fn lower_bound_block_num(&self, block_num: u32) -> Option<BlockHandle> {
        self.from_block_num(block_num).next()
    }

    /// Blocks from height `block_num` upwards in block number order.
    pub fn from_block_num(&self, block_num: u32) -> impl Iterator<Item = BlockHandle> + '_ {
        let start = ByBlockNumKey {
            block_num,
            in_current_chain: true,
        };
        self.views.by_num.range((start, BlockHandle::MIN)..).map(|(_, handle)| *handle)
    }

    /// Block with the lowest number.
    pub fn oldest(&self) -> Option<BlockHandle> {
        self.views.by_num.first().map(|(_, handle)| *handle)
    }

    /// Block with the highest (dpos LIB, bft LIB, block number).
    pub fn best_irreversible(&self) -> Option<BlockHandle> {
        self.views.by_lib.first().map(|(_, handle)| *handle)
    }

    /// All handles, best irreversibility candidate first.
    pub fn by_irreversibility(&self) -> impl Iterator<Item = BlockHandle> + '_ {
        self.views.by_lib.iter().map(|(_, handle)| *handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockHandle, &BlockState)> + '_ {
        self.slots.iter().enumerate().filter_map(|(slot, s)| {
            s.entry.as_ref().map(|entry| {
                let handle = BlockHandle {
                    slot: slot as u32,
                    generation: s.generation,
                };
                (handle, &entry.state)
            })
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
        self.by_id.clear();
        self.views.clear();
    }

    pub fn view_sizes(&self) -> ViewSizes {
        ViewSizes {
            primary: self.len,
            by_id: self.by_id.len(),
            by_prev: self.views.by_prev.len(),
            by_block_num: self.views.by_num.len(),
            by_lib: self.views.by_lib.len(),
        }
    }

    fn entry(&self, handle: BlockHandle) -> Option<&Entry> {
        self.slots
            .get(handle.slot as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn check_views(&self) {
        debug_assert!(
            self.view_sizes().is_consistent(),
            "fork index views out of step: {:?}",
            self.view_sizes()
        );
    }
}
