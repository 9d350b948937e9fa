//! Producer schedules and slot rotation

use serde::{Deserialize, Serialize};

use crate::{crypto::PublicKey, hash::Digest, name::AccountName, params::PRODUCER_REPETITIONS};

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, minicbor::Encode, minicbor::Decode,
)]
pub struct ProducerKey {
    #[n(0)]
    pub producer_name: AccountName,

    #[n(1)]
    pub block_signing_key: PublicKey,
}

/// Ordered set of producers taking turns, each for `PRODUCER_REPETITIONS`
/// consecutive slots.
#[derive(
    Debug,
    Default,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    minicbor::Encode,
    minicbor::Decode,
)]
pub struct ProducerSchedule {
    #[n(0)]
    pub version: u32,

    #[n(1)]
    pub producers: Vec<ProducerKey>,
}

impl ProducerSchedule {
    pub fn new(version: u32, producers: Vec<ProducerKey>) -> Self {
        Self { version, producers }
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn producer_key(&self, name: &AccountName) -> Option<&PublicKey> {
        self.producers
            .iter()
            .find(|p| &p.producer_name == name)
            .map(|p| &p.block_signing_key)
    }

    /// Producer owning `slot`, or None for an empty schedule.
    pub fn scheduled_producer(&self, slot: u32) -> Option<&ProducerKey> {
        if self.producers.is_empty() {
            return None;
        }
        let count = self.producers.len() as u64;
        let repetitions = u64::from(PRODUCER_REPETITIONS);
        let index = (u64::from(slot) % (count * repetitions)) / repetitions;
        self.producers.get(index as usize)
    }

    pub fn digest(&self) -> Digest {
        Digest::of_encoded(self)
    }
}
