//! Deterministic fixtures shared by the workspace tests.

use dpos_common::{
    AccountName, BlockTimestamp, Digest, PrivateKey, ProducerKey, ProducerSchedule,
};

/// Slot of 2018-06-01T12:00:00Z, a multiple of every small rotation length
/// so the first producer of a schedule owns the genesis slot.
pub const GENESIS_SLOT: u32 = 1_162_339_200;

pub fn genesis_timestamp() -> BlockTimestamp {
    BlockTimestamp::new(GENESIS_SLOT)
}

/// Parse an account name, panicking on invalid input.
pub fn name(s: &str) -> AccountName {
    s.parse().unwrap_or_else(|e| panic!("invalid account name {s}: {e}"))
}

/// Signing key of a producer, seeded from the SHA-256 of its name.
pub fn producer_key(producer: AccountName) -> PrivateKey {
    PrivateKey::from_seed(Digest::sha256(producer.to_string()).into_inner())
}

pub fn producer_schedule(version: u32, names: &[&str]) -> ProducerSchedule {
    let producers = names
        .iter()
        .map(|s| {
            let producer_name = name(s);
            ProducerKey {
                producer_name,
                block_signing_key: producer_key(producer_name).public_key(),
            }
        })
        .collect();
    ProducerSchedule::new(version, producers)
}

/// Stand-in chain id for genesis states.
pub fn chain_id() -> Digest {
    Digest::sha256(b"dpos test chain")
}

/// A distinct digest per `n`.
pub fn digest(n: u64) -> Digest {
    Digest::sha256(n.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_deterministic_and_distinct() {
        let eosio = name("eosio");
        let p2 = name("p2");
        assert_eq!(producer_key(eosio).public_key(), producer_key(eosio).public_key());
        assert_ne!(producer_key(eosio).public_key(), producer_key(p2).public_key());
    }

    #[test]
    fn test_schedule_uses_producer_keys() {
        let schedule = producer_schedule(3, &["eosio", "p2"]);
        assert_eq!(schedule.version, 3);
        assert_eq!(
            schedule.producer_key(&name("p2")),
            Some(&producer_key(name("p2")).public_key())
        );
    }

    #[test]
    fn test_genesis_slot_starts_a_rotation() {
        for producers in 1..=4u32 {
            assert_eq!(GENESIS_SLOT % (producers * 12), 0);
        }
    }
}
