//! Incremental merkle tree over the ids of every ancestor block.
//!
//! Only the O(log n) "active nodes" needed for the next append are kept;
//! the last active node is always the current root.

use serde::{Deserialize, Serialize};

use crate::hash::Digest;

/// Bit of the first byte marking a node as the right operand of a pair.
const CANONICAL_RIGHT_BIT: u8 = 0x80;

fn make_canonical_left(value: &Digest) -> Digest {
    let mut bytes = value.into_inner();
    bytes[0] &= !CANONICAL_RIGHT_BIT;
    Digest::new(bytes)
}

fn make_canonical_right(value: &Digest) -> Digest {
    let mut bytes = value.into_inner();
    bytes[0] |= CANONICAL_RIGHT_BIT;
    Digest::new(bytes)
}

/// Hash of a (left, right) pair after marking each operand's role.
pub fn pair_hash(left: &Digest, right: &Digest) -> Digest {
    Digest::sha256_pair(&make_canonical_left(left), &make_canonical_right(right))
}

pub fn is_canonical_left(value: &Digest) -> bool {
    value[0] & CANONICAL_RIGHT_BIT == 0
}

pub fn is_canonical_right(value: &Digest) -> bool {
    !is_canonical_left(value)
}

/// Depth of the smallest balanced binary tree holding `node_count` leaves.
pub fn calculate_max_depth(node_count: u64) -> usize {
    if node_count == 0 {
        return 0;
    }
    node_count.next_power_of_two().trailing_zeros() as usize + 1
}

/// One-shot merkle root of a full list of digests.
///
/// An odd tail at any level is paired with itself. The empty list has the
/// zero digest as root.
pub fn merkle(mut ids: Vec<Digest>) -> Digest {
    if ids.is_empty() {
        return Digest::default();
    }

    while ids.len() > 1 {
        if ids.len() % 2 == 1 {
            let last = ids[ids.len() - 1];
            ids.push(last);
        }
        ids = ids.chunks_exact(2).map(|pair| pair_hash(&pair[0], &pair[1])).collect();
    }

    ids[0]
}

/// Incremental merkle accumulator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementalMerkle {
    node_count: u64,
    active_nodes: Vec<Digest>,
}

impl IncrementalMerkle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    pub fn active_nodes(&self) -> &[Digest] {
        &self.active_nodes
    }

    /// Current root, or the zero digest if nothing was appended yet.
    pub fn root(&self) -> Digest {
        match self.active_nodes.last() {
            Some(root) if self.node_count > 0 => *root,
            _ => Digest::default(),
        }
    }

    /// Add a leaf and return the new root.
    ///
    /// Walk from the new leaf towards the root. A "left" node (even index at
    /// its level) pairs with an implied copy of itself, producing a partial
    /// node; the first fully realised left value on the way up must be
    /// remembered for the next append. A "right" node consumes the stored
    /// left sibling from the previous active nodes, which stays active only
    /// if the current subtree is still partial. The collapsed top is always
    /// appended last and doubles as the root.
    pub fn append(&mut self, digest: Digest) -> Digest {
        let max_depth = calculate_max_depth(self.node_count + 1);
        let mut updated = Vec::with_capacity(max_depth);
        let mut previous = self.active_nodes.iter();
        let mut index = self.node_count;
        let mut top = digest;
        let mut partial = false;

        for _ in 1..max_depth {
            if index & 1 == 0 {
                // A partial node is never fully realised, so only record
                // the first left value on the way up
                if !partial {
                    updated.push(top);
                }
                top = pair_hash(&top, &top);
                partial = true;
            } else {
                let left = *previous
                    .next()
                    .expect("active nodes hold every left sibling of a right node");
                if partial {
                    updated.push(left);
                }
                top = pair_hash(&left, &top);
            }
            index >>= 1;
        }

        updated.push(top);
        self.active_nodes = updated;
        self.node_count += 1;
        top
    }
}
