//! Consensus state as of one block header, and the pure transitions
//! producing the state of the next block.
//!
//! A state is never changed once it is accepted: [`BlockHeaderState::next`]
//! validates a received header against its parent and returns a new state,
//! [`BlockHeaderState::generate_next`] prepares the template a producer
//! fills in, finalizes and signs.

use dpos_common::{
    params::{MAX_PRODUCERS, MAX_TRACKED_DPOS_CONFIRMATIONS},
    AccountName, BlockHeader, BlockId, BlockTimestamp, Digest, HeaderConfirmation,
    IncrementalMerkle, ProducerKey, ProducerSchedule, PublicKey, Signature, SignedBlockHeader,
};
use imbl::OrdMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fork_error::ForkDatabaseError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeaderState {
    /// Zero until the header is finalized or accepted.
    pub block_id: BlockId,
    pub block_num: u32,
    pub header: SignedBlockHeader,

    /// Highest block that collected confirmations from 2/3+ producers.
    pub dpos_proposed_irreversible_block_num: u32,
    pub dpos_irreversible_block_num: u32,
    pub bft_irreversible_block_num: u32,

    pub pending_schedule_lib_num: u32,
    pub pending_schedule_hash: Digest,
    pub pending_schedule: ProducerSchedule,
    pub active_schedule: ProducerSchedule,

    /// Merkle accumulator over the ids of every ancestor.
    pub block_root_merkle: IncrementalMerkle,
    pub producer_to_last_produced: OrdMap<AccountName, u32>,
    pub producer_to_last_implied_irb: OrdMap<AccountName, u32>,
    pub block_signing_key: PublicKey,

    /// Confirmations still needed by each recent block, oldest first.
    pub confirm_count: Vec<u8>,
    pub confirmations: Vec<HeaderConfirmation>,
}

impl BlockHeaderState {
    /// State of the first block of a chain.
    ///
    /// The initial schedule is both active and pending, so it is promoted
    /// with a fresh producer map by the first block built on top.
    pub fn genesis(
        timestamp: BlockTimestamp,
        initial_schedule: ProducerSchedule,
        chain_id: Digest,
    ) -> Self {
        let first = initial_schedule.producers.first();
        let header = BlockHeader {
            timestamp,
            producer: first.map(|p| p.producer_name).unwrap_or_default(),
            confirmed: 1,
            action_mroot: chain_id,
            schedule_version: initial_schedule.version,
            ..BlockHeader::default()
        };

        Self {
            block_id: header.block_id(),
            block_num: header.block_num(),
            block_signing_key: first.map(|p| p.block_signing_key).unwrap_or_default(),
            header: SignedBlockHeader {
                header,
                producer_signature: Signature::default(),
            },
            dpos_proposed_irreversible_block_num: 0,
            dpos_irreversible_block_num: 0,
            bft_irreversible_block_num: 0,
            pending_schedule_lib_num: 0,
            pending_schedule_hash: initial_schedule.digest(),
            pending_schedule: initial_schedule.clone(),
            active_schedule: initial_schedule,
            block_root_merkle: IncrementalMerkle::new(),
            producer_to_last_produced: OrdMap::new(),
            producer_to_last_implied_irb: OrdMap::new(),
            confirm_count: Vec::new(),
            confirmations: Vec::new(),
        }
    }

    pub fn timestamp(&self) -> BlockTimestamp {
        self.header.header.timestamp
    }

    pub fn producer(&self) -> AccountName {
        self.header.header.producer
    }

    pub fn previous(&self) -> BlockId {
        self.header.header.previous
    }

    /// Producer of the active schedule owning slot `t`.
    pub fn get_scheduled_producer(
        &self,
        t: BlockTimestamp,
    ) -> Result<&ProducerKey, ForkDatabaseError> {
        self.active_schedule.scheduled_producer(t.slot()).ok_or_else(|| {
            ForkDatabaseError::ProducerSchedule(format!(
                "active schedule version {} has no producers",
                self.active_schedule.version
            ))
        })
    }

    /// DPoS irreversible block: 2/3 of the producers imply at least this
    /// height, so take the value a third of the way up the sorted list.
    pub fn calc_dpos_last_irreversible(&self) -> u32 {
        let mut block_nums: Vec<u32> = self.producer_to_last_implied_irb.values().copied().collect();
        if block_nums.is_empty() {
            return 0;
        }
        block_nums.sort_unstable();
        block_nums[(block_nums.len() - 1) / 3]
    }

    /// Unsigned template of the block following this one at `when`, or at
    /// the next slot.
    pub fn generate_next(&self, when: Option<BlockTimestamp>) -> Result<Self, ForkDatabaseError> {
        let when = match when {
            Some(when) if when <= self.timestamp() => {
                return Err(ForkDatabaseError::BlockValidate(format!(
                    "next block must be in the future: {when} is not after {}",
                    self.timestamp()
                )));
            }
            Some(when) => when,
            None => self
                .timestamp()
                .next()
                .map_err(|e| ForkDatabaseError::BlockValidate(e.to_string()))?,
        };

        let producer = self.get_scheduled_producer(when)?.clone();
        let block_num = self.block_num + 1;

        let mut producer_to_last_produced = self.producer_to_last_produced.clone();
        producer_to_last_produced.insert(producer.producer_name, block_num);

        let mut producer_to_last_implied_irb = self.producer_to_last_implied_irb.clone();
        producer_to_last_implied_irb
            .insert(producer.producer_name, self.dpos_proposed_irreversible_block_num);

        let mut block_root_merkle = self.block_root_merkle.clone();
        block_root_merkle.append(self.block_id.into_inner());

        // The schedule that signs this block is the one confirming it
        let required_confs = u8::try_from(self.active_schedule.len() * 2 / 3 + 1).map_err(|_| {
            ForkDatabaseError::ProducerSchedule(format!(
                "{} active producers cannot be tracked",
                self.active_schedule.len()
            ))
        })?;
        let keep_from = usize::from(self.confirm_count.len() >= MAX_TRACKED_DPOS_CONFIRMATIONS);
        let mut confirm_count = Vec::with_capacity(self.confirm_count.len() + 1);
        confirm_count.extend_from_slice(&self.confirm_count[keep_from..]);
        confirm_count.push(required_confs);

        let mut result = Self {
            block_id: BlockId::default(),
            block_num,
            header: SignedBlockHeader {
                header: BlockHeader {
                    timestamp: when,
                    producer: producer.producer_name,
                    previous: self.block_id,
                    schedule_version: self.active_schedule.version,
                    ..BlockHeader::default()
                },
                producer_signature: Signature::default(),
            },
            dpos_proposed_irreversible_block_num: self.dpos_proposed_irreversible_block_num,
            dpos_irreversible_block_num: 0,
            bft_irreversible_block_num: self.bft_irreversible_block_num,
            pending_schedule_lib_num: self.pending_schedule_lib_num,
            pending_schedule_hash: self.pending_schedule_hash,
            pending_schedule: self.pending_schedule.clone(),
            active_schedule: self.active_schedule.clone(),
            block_root_merkle,
            producer_to_last_produced,
            producer_to_last_implied_irb,
            block_signing_key: producer.block_signing_key,
            confirm_count,
            confirmations: Vec::new(),
        };
        result.dpos_irreversible_block_num = result.calc_dpos_last_irreversible();

        Ok(result)
    }

    /// Validate `header` as the successor of this state and return the
    /// accepted state. With `trust` the producer signature is not checked.
    pub fn next(
        &self,
        header: &SignedBlockHeader,
        trust: bool,
    ) -> Result<Self, ForkDatabaseError> {
        let h = &header.header;
        if h.timestamp.slot() == 0 {
            return Err(ForkDatabaseError::BlockValidate("block timestamp is not set".into()));
        }
        if !h.header_extensions.is_empty() {
            return Err(ForkDatabaseError::BlockValidate("no supported extensions".into()));
        }
        if h.timestamp <= self.timestamp() {
            return Err(ForkDatabaseError::BlockValidate(format!(
                "block must be later in time: {} is not after {}",
                h.timestamp,
                self.timestamp()
            )));
        }
        if h.previous != self.block_id {
            return Err(ForkDatabaseError::UnlinkableBlock {
                block: header.block_id(),
                previous: h.previous,
            });
        }

        let mut result = self.generate_next(Some(h.timestamp))?;

        if result.producer() != h.producer {
            return Err(ForkDatabaseError::WrongProducer {
                expected: result.producer(),
                got: h.producer,
            });
        }
        if result.header.header.schedule_version != h.schedule_version {
            return Err(ForkDatabaseError::ProducerSchedule(format!(
                "wrong schedule version: expected {}, got {}",
                result.header.header.schedule_version, h.schedule_version
            )));
        }

        // A range reaching back past genesis cannot overlap anything
        if let (Some(last), Some(first_confirmed)) = (
            self.producer_to_last_produced.get(&h.producer),
            result.block_num.checked_sub(u32::from(h.confirmed)),
        ) {
            if *last >= first_confirmed {
                return Err(ForkDatabaseError::ProducerDoubleConfirm {
                    producer: h.producer,
                    block_num: result.block_num,
                });
            }
        }

        // State changes that cannot be validated from headers alone
        result.set_confirmed(h.confirmed);
        let promoted = result.maybe_promote_pending();

        if let Some(new_producers) = &h.new_producers {
            if promoted {
                return Err(ForkDatabaseError::ProducerSchedule(
                    "cannot set a pending schedule in the block that promoted the previous one"
                        .into(),
                ));
            }
            result.set_new_producers(new_producers.clone())?;
        }

        result.header.header.action_mroot = h.action_mroot;
        result.header.header.transaction_mroot = h.transaction_mroot;
        result.header.producer_signature = header.producer_signature;
        result.block_id = result.header.block_id();

        if !trust {
            check_signer(
                &result.header.producer_signature,
                &result.sig_digest(),
                &result.block_signing_key,
            )?;
        }

        debug!(
            block_num = result.block_num,
            id = %result.block_id,
            producer = %result.producer(),
            dpos_lib = result.dpos_irreversible_block_num,
            "Accepted block header"
        );

        Ok(result)
    }

    /// Record that this block confirms `num_prev_blocks` blocks before it.
    ///
    /// Each confirmed block, newest first, needs one confirmation less; the
    /// first one with none left becomes the proposed irreversible block and
    /// drops out together with everything older.
    pub fn set_confirmed(&mut self, num_prev_blocks: u16) {
        self.header.header.confirmed = num_prev_blocks;

        let len = self.confirm_count.len();
        let blocks_to_confirm = usize::from(num_prev_blocks) + 1;
        for i in (0..len).rev().take(blocks_to_confirm) {
            self.confirm_count[i] = self.confirm_count[i].saturating_sub(1);
            if self.confirm_count[i] == 0 {
                let distance = (len - 1 - i) as u32;
                self.dpos_proposed_irreversible_block_num = self.block_num.saturating_sub(distance);
                self.confirm_count.drain(..=i);
                return;
            }
        }
    }

    /// Promote the pending schedule once its block became irreversible.
    pub fn maybe_promote_pending(&mut self) -> bool {
        if self.pending_schedule.is_empty()
            || self.dpos_irreversible_block_num < self.pending_schedule_lib_num
        {
            return false;
        }

        self.active_schedule = std::mem::take(&mut self.pending_schedule);

        let lib = self.dpos_irreversible_block_num;
        self.producer_to_last_produced =
            carry_forward(&self.producer_to_last_produced, &self.active_schedule, lib);
        self.producer_to_last_implied_irb =
            carry_forward(&self.producer_to_last_implied_irb, &self.active_schedule, lib);
        self.producer_to_last_produced.insert(self.producer(), self.block_num);

        debug!(
            block_num = self.block_num,
            version = self.active_schedule.version,
            "Promoted pending producer schedule"
        );
        true
    }

    /// Propose `pending` as the next schedule.
    pub fn set_new_producers(&mut self, pending: ProducerSchedule) -> Result<(), ForkDatabaseError> {
        if self.active_schedule.version.checked_add(1) != Some(pending.version) {
            return Err(ForkDatabaseError::ProducerSchedule(format!(
                "wrong producer schedule version: expected {}, got {}",
                u64::from(self.active_schedule.version) + 1,
                pending.version
            )));
        }
        if !self.pending_schedule.is_empty() {
            return Err(ForkDatabaseError::ProducerSchedule(
                "cannot set new pending producers until last pending is confirmed".into(),
            ));
        }
        if pending.len() > MAX_PRODUCERS {
            return Err(ForkDatabaseError::ProducerSchedule(format!(
                "schedule of {} producers exceeds the maximum of {MAX_PRODUCERS}",
                pending.len()
            )));
        }

        self.pending_schedule_hash = pending.digest();
        self.pending_schedule_lib_num = self.block_num;
        self.header.header.new_producers = Some(pending.clone());
        self.pending_schedule = pending;
        Ok(())
    }

    /// Fill in the merkle roots of a produced block and derive its id.
    pub fn finalize(&mut self, transaction_mroot: Digest, action_mroot: Digest) {
        self.header.header.transaction_mroot = transaction_mroot;
        self.header.header.action_mroot = action_mroot;
        self.block_id = self.header.block_id();
    }

    /// Digest the producer signs: binds the header to the ancestor merkle
    /// root and the pending schedule.
    pub fn sig_digest(&self) -> Digest {
        let header_bmroot =
            Digest::sha256_pair(&self.header.header.digest(), &self.block_root_merkle.root());
        Digest::sha256_pair(&header_bmroot, &self.pending_schedule_hash)
    }

    /// Sign the block, keeping the signature only if it is made with the
    /// scheduled signing key.
    pub fn sign<F>(&mut self, signer: F) -> Result<(), ForkDatabaseError>
    where
        F: FnOnce(&Digest) -> Signature,
    {
        let digest = self.sig_digest();
        let signature = signer(&digest);
        check_signer(&signature, &digest, &self.block_signing_key)?;
        self.header.producer_signature = signature;
        Ok(())
    }

    /// Key that signed this block.
    pub fn signee(&self) -> Result<PublicKey, ForkDatabaseError> {
        Ok(self.header.producer_signature.recover(&self.sig_digest())?)
    }

    /// Record a BFT confirmation from a producer of the active schedule.
    pub fn add_confirmation(&mut self, conf: HeaderConfirmation) -> Result<(), ForkDatabaseError> {
        if self.confirmations.iter().any(|c| c.producer == conf.producer) {
            return Err(ForkDatabaseError::ProducerDoubleConfirm {
                producer: conf.producer,
                block_num: self.block_num,
            });
        }

        let key = *self
            .active_schedule
            .producer_key(&conf.producer)
            .ok_or(ForkDatabaseError::ProducerNotInSchedule {
                producer: conf.producer,
            })?;
        check_signer(&conf.producer_signature, &self.sig_digest(), &key)?;

        self.confirmations.push(conf);
        Ok(())
    }
}

/// Rebuild a per-producer map over `schedule`, keeping known values.
fn carry_forward(
    map: &OrdMap<AccountName, u32>,
    schedule: &ProducerSchedule,
    default: u32,
) -> OrdMap<AccountName, u32> {
    schedule
        .producers
        .iter()
        .map(|p| (p.producer_name, map.get(&p.producer_name).copied().unwrap_or(default)))
        .collect()
}

fn check_signer(
    signature: &Signature,
    digest: &Digest,
    expected: &PublicKey,
) -> Result<(), ForkDatabaseError> {
    match signature.recover(digest) {
        Ok(key) if key == *expected => Ok(()),
        Ok(key) => Err(ForkDatabaseError::WrongSigningKey {
            expected: *expected,
            got: key,
        }),
        Err(_) => Err(ForkDatabaseError::WrongSigningKey {
            expected: *expected,
            got: *signature.signer(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_chain::{genesis, produce, produce_with};
    use dpos_common::CryptoError;
    use dpos_test_utils::{digest, name, producer_key, producer_schedule, GENESIS_SLOT};
    use test_case::test_case;

    fn three_producers() -> BlockHeaderState {
        genesis(&["eosio", "p2", "p3"])
    }

    #[test]
    fn test_genesis_is_block_one() {
        let bs = three_producers();
        assert_eq!(bs.block_num, 1);
        assert_eq!(bs.block_id.block_num(), 1);
        assert_eq!(bs.block_id, bs.header.block_id());
        assert_eq!(bs.pending_schedule, bs.active_schedule);
    }

    #[test_case(100, "p3")]
    #[test_case(110, "eosio")]
    #[test_case(120, "p2")]
    #[test_case(GENESIS_SLOT + 12, "p2")]
    fn test_scheduled_producer_rotation(slot: u32, expected: &str) {
        let bs = three_producers();
        let producer = bs.get_scheduled_producer(BlockTimestamp::new(slot)).unwrap();
        assert_eq!(producer.producer_name, name(expected));
    }

    #[test]
    fn test_scheduled_producer_needs_producers() {
        let bs = genesis(&[]);
        assert!(matches!(
            bs.get_scheduled_producer(BlockTimestamp::new(5)),
            Err(ForkDatabaseError::ProducerSchedule(_))
        ));
    }

    #[test]
    fn test_generate_next_timestamps() {
        let bs = three_producers();
        let default = bs.generate_next(None).unwrap();
        let later = bs.generate_next(Some(BlockTimestamp::new(GENESIS_SLOT + 100))).unwrap();
        assert_eq!(default.timestamp(), BlockTimestamp::new(GENESIS_SLOT + 1));
        assert_eq!(later.timestamp(), BlockTimestamp::new(GENESIS_SLOT + 100));

        assert!(matches!(
            bs.generate_next(Some(bs.timestamp())),
            Err(ForkDatabaseError::BlockValidate(_))
        ));
    }

    #[test]
    fn test_generate_next_links_to_prior() {
        let bs = three_producers();
        let next = bs.generate_next(None).unwrap();
        assert_eq!(next.block_num, 2);
        assert_eq!(next.previous(), bs.block_id);
        assert_eq!(next.header.block_id().block_num(), 2);
        assert_eq!(next.block_id, BlockId::default());
        assert_eq!(next.block_root_merkle.root(), bs.block_id.into_inner());
        assert_eq!(next.producer_to_last_produced.get(&name("eosio")), Some(&2));

        let third = next.generate_next(None).unwrap();
        assert_eq!(third.block_num, 3);
    }

    #[test]
    fn test_confirmation_countdown() {
        let bs = three_producers();

        let mut next = bs.generate_next(None).unwrap();
        assert_eq!(next.confirm_count, vec![3]);
        next.set_confirmed(10);
        assert_eq!(next.confirm_count, vec![2]);

        let mut after = next.generate_next(None).unwrap();
        after.set_confirmed(2);
        assert_eq!(after.confirm_count, vec![1, 2]);
    }

    #[test]
    fn test_confirm_count_is_bounded() {
        let mut bs = genesis(&["eosio", "p2", "p3", "p4"]);
        bs.confirm_count = vec![3; MAX_TRACKED_DPOS_CONFIRMATIONS];
        bs.confirm_count[0] = 1;
        let next = bs.generate_next(None).unwrap();
        assert_eq!(next.confirm_count.len(), MAX_TRACKED_DPOS_CONFIRMATIONS);
        assert_eq!(next.confirm_count[0], 3);
        assert_eq!(next.confirm_count.last(), Some(&3));
    }

    #[test]
    fn test_confirmation_reaching_zero_proposes_irreversible() {
        let mut bs = three_producers().generate_next(None).unwrap();
        bs.block_num = 10;
        bs.confirm_count = vec![1, 2, 3];
        bs.set_confirmed(2);
        assert_eq!(bs.dpos_proposed_irreversible_block_num, 8);
        assert_eq!(bs.confirm_count, vec![1, 2]);
    }

    #[test]
    fn test_dpos_lib_is_two_thirds_quorum() {
        let mut bs = three_producers();
        assert_eq!(bs.calc_dpos_last_irreversible(), 0);

        bs.producer_to_last_implied_irb =
            [(name("eosio"), 5u32), (name("p2"), 10u32), (name("p3"), 7u32)].into_iter().collect();
        assert_eq!(bs.calc_dpos_last_irreversible(), 5);

        bs.producer_to_last_implied_irb.insert(name("p4"), 9);
        assert_eq!(bs.calc_dpos_last_irreversible(), 7);
    }

    #[test]
    fn test_produced_block_is_accepted_unchanged() {
        let bs = three_producers();
        let produced = produce(&bs);
        let accepted = bs.next(&produced.header, false).unwrap();
        assert_eq!(accepted, produced);
        assert_eq!(accepted.block_id, accepted.header.block_id());
        assert_eq!(accepted.signee().unwrap(), accepted.block_signing_key);
    }

    #[test]
    fn test_first_block_promotes_initial_schedule() {
        let bs = three_producers();
        let next = bs.next(&produce(&bs).header, false).unwrap();
        assert!(next.pending_schedule.is_empty());
        assert_eq!(next.active_schedule, bs.active_schedule);
        assert_eq!(next.producer_to_last_produced.len(), 3);
        assert_eq!(next.producer_to_last_produced.get(&name("p2")), Some(&0));
        assert_eq!(next.producer_to_last_produced.get(&name("eosio")), Some(&2));
    }

    #[test]
    fn test_single_producer_lib_trails_head() {
        let mut bs = genesis(&["eosio"]);
        for _ in 0..5 {
            bs = bs.next(&produce(&bs).header, false).unwrap();
        }
        assert_eq!(bs.block_num, 6);
        assert_eq!(bs.dpos_proposed_irreversible_block_num, 6);
        assert_eq!(bs.dpos_irreversible_block_num, 5);
        assert!(bs.confirm_count.is_empty());
    }

    #[test]
    fn test_next_rejects_unlinkable_header() {
        let bs = three_producers();
        let mut header = produce(&bs).header;
        header.header.previous = digest(99).into();
        assert!(matches!(
            bs.next(&header, false),
            Err(ForkDatabaseError::UnlinkableBlock { .. })
        ));
    }

    #[test]
    fn test_next_rejects_malformed_headers() {
        let bs = three_producers();
        let valid = produce(&bs).header;

        let mut stale = valid.clone();
        stale.header.timestamp = bs.timestamp();
        assert!(matches!(bs.next(&stale, false), Err(ForkDatabaseError::BlockValidate(_))));

        let mut unset = valid.clone();
        unset.header.timestamp = BlockTimestamp::new(0);
        assert!(matches!(bs.next(&unset, false), Err(ForkDatabaseError::BlockValidate(_))));

        let mut extended = valid;
        extended.header.header_extensions.push(dpos_common::Extension {
            kind: 0,
            data: Vec::new(),
        });
        assert!(matches!(bs.next(&extended, false), Err(ForkDatabaseError::BlockValidate(_))));
    }

    #[test]
    fn test_next_rejects_wrong_producer_and_version() {
        let bs = three_producers();
        let valid = produce(&bs).header;

        let mut impostor = valid.clone();
        impostor.header.producer = name("p2");
        assert_eq!(
            bs.next(&impostor, true),
            Err(ForkDatabaseError::WrongProducer {
                expected: name("eosio"),
                got: name("p2"),
            })
        );

        let mut version = valid;
        version.header.schedule_version = 7;
        assert!(matches!(bs.next(&version, true), Err(ForkDatabaseError::ProducerSchedule(_))));
    }

    #[test]
    fn test_next_rejects_double_confirmation() {
        let mut bs = genesis(&["eosio"]);
        bs = bs.next(&produce(&bs).header, false).unwrap();

        // eosio produced block 2; block 3 confirming block 2 overlaps it
        let header = produce_with(&bs, None, 1).header;
        assert_eq!(
            bs.next(&header, true),
            Err(ForkDatabaseError::ProducerDoubleConfirm {
                producer: name("eosio"),
                block_num: 3,
            })
        );
    }

    #[test]
    fn test_next_checks_signature_unless_trusted() {
        let bs = three_producers();
        let mut header = produce(&bs).header;
        let digest = Digest::sha256(b"something else");
        header.producer_signature = producer_key(name("eosio")).sign(&digest);

        assert!(matches!(
            bs.next(&header, false),
            Err(ForkDatabaseError::WrongSigningKey { .. })
        ));
        assert!(bs.next(&header, true).is_ok());

        header.producer_signature = producer_key(name("p2")).sign(&digest);
        assert!(matches!(
            bs.next(&header, false),
            Err(ForkDatabaseError::WrongSigningKey { .. })
        ));
    }

    #[test]
    fn test_sign_rejects_unscheduled_key() {
        let mut next = three_producers().generate_next(None).unwrap();
        next.finalize(Digest::default(), Digest::default());
        let wrong = producer_key(name("p3"));
        assert_eq!(
            next.sign(|d| wrong.sign(d)),
            Err(ForkDatabaseError::WrongSigningKey {
                expected: next.block_signing_key,
                got: wrong.public_key(),
            })
        );
        assert!(next.header.producer_signature.is_empty());

        let right = producer_key(name("eosio"));
        next.sign(|d| right.sign(d)).unwrap();
        assert_eq!(next.signee().unwrap(), right.public_key());
    }

    #[test]
    fn test_signee_keeps_recovery_error() {
        let mut next = three_producers().generate_next(None).unwrap();
        next.finalize(Digest::default(), Digest::default());
        assert_eq!(next.signee(), Err(ForkDatabaseError::Signature(CryptoError::MissingSignature)));

        let key = producer_key(name("eosio"));
        next.header.producer_signature = key.sign(&Digest::sha256(b"something else"));
        assert_eq!(next.signee(), Err(ForkDatabaseError::Signature(CryptoError::InvalidSignature)));
    }

    #[test]
    fn test_sig_digest_covers_pending_schedule() {
        let mut bs = three_producers();
        let before = bs.sig_digest();
        bs.pending_schedule_hash = digest(1);
        assert_ne!(bs.sig_digest(), before);
    }

    #[test]
    fn test_new_producers_become_active_once_irreversible() {
        let mut bs = genesis(&["eosio"]);
        bs = bs.next(&produce(&bs).header, false).unwrap();

        let mut proposal = bs.generate_next(None).unwrap();
        let schedule = producer_schedule(1, &["eosio", "p2"]);
        proposal.set_new_producers(schedule.clone()).unwrap();
        assert_eq!(proposal.pending_schedule_lib_num, 3);
        assert_eq!(proposal.pending_schedule_hash, schedule.digest());
        proposal.finalize(Digest::default(), Digest::default());
        let key = producer_key(name("eosio"));
        proposal.sign(|d| key.sign(d)).unwrap();

        bs = bs.next(&proposal.header, false).unwrap();
        assert_eq!(bs.pending_schedule, schedule);
        assert_eq!(bs.active_schedule.version, 0);

        // Block 4 makes block 3 irreversible with a single producer
        bs = bs.next(&produce(&bs).header, false).unwrap();
        assert_eq!(bs.dpos_irreversible_block_num, 3);
        assert_eq!(bs.active_schedule, schedule);
        assert!(bs.pending_schedule.is_empty());
        assert_eq!(bs.producer_to_last_produced.get(&name("p2")), Some(&3));
        assert_eq!(bs.producer_to_last_produced.get(&name("eosio")), Some(&4));
    }

    #[test]
    fn test_set_new_producers_checks_version_and_pending() {
        let bs = three_producers();
        let mut next = bs.generate_next(None).unwrap();
        assert!(matches!(
            next.set_new_producers(producer_schedule(5, &["eosio"])),
            Err(ForkDatabaseError::ProducerSchedule(_))
        ));
        // Initial schedule is still pending
        assert!(matches!(
            next.set_new_producers(producer_schedule(1, &["eosio"])),
            Err(ForkDatabaseError::ProducerSchedule(_))
        ));
    }

    #[test]
    fn test_new_producers_rejected_in_promoting_block() {
        let bs = three_producers();
        let mut header = produce(&bs).header;
        header.header.new_producers = Some(producer_schedule(1, &["p2"]));
        assert!(matches!(bs.next(&header, true), Err(ForkDatabaseError::ProducerSchedule(_))));
    }

    #[test]
    fn test_add_confirmation_rules() {
        let bs = three_producers();
        let mut block = bs.next(&produce(&bs).header, false).unwrap();
        let confirm = |producer: &str, signer: &str| HeaderConfirmation {
            block_id: block.block_id,
            producer: name(producer),
            producer_signature: producer_key(name(signer)).sign(&block.sig_digest()),
        };

        let from_p2 = confirm("p2", "p2");
        let from_p2_again = from_p2.clone();
        let outsider = confirm("outsider", "outsider");
        let forged = confirm("p3", "eosio");

        block.add_confirmation(from_p2).unwrap();
        assert_eq!(block.confirmations.len(), 1);
        assert!(matches!(
            block.add_confirmation(from_p2_again),
            Err(ForkDatabaseError::ProducerDoubleConfirm { .. })
        ));
        assert_eq!(
            block.add_confirmation(outsider),
            Err(ForkDatabaseError::ProducerNotInSchedule {
                producer: name("outsider"),
            })
        );
        assert!(matches!(
            block.add_confirmation(forged),
            Err(ForkDatabaseError::WrongSigningKey { .. })
        ));
        assert_eq!(block.confirmations.len(), 1);
    }

    #[test]
    fn test_serde_json_round_trip() {
        let bs = three_producers();
        let next = bs.next(&produce(&bs).header, false).unwrap();
        let json = serde_json::to_string(&next).unwrap();
        let back: BlockHeaderState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, next);
    }
}
