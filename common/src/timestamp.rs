//! Block timestamps, counted in block-interval slots since the chain epoch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::params::{BLOCK_INTERVAL_MS, BLOCK_TIMESTAMP_EPOCH_MS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("block timestamp overflow after slot {0}")]
    Overflow(u32),

    #[error("time {0} ms is before the block timestamp epoch")]
    BeforeEpoch(i64),
}

/// Slot number of a block.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BlockTimestamp(pub u32);

impl BlockTimestamp {
    pub const fn new(slot: u32) -> Self {
        Self(slot)
    }

    pub const fn slot(&self) -> u32 {
        self.0
    }

    /// Slot containing the given Unix time.
    pub fn from_unix_millis(millis: i64) -> Result<Self, TimestampError> {
        let since_epoch = millis - BLOCK_TIMESTAMP_EPOCH_MS;
        if since_epoch < 0 {
            return Err(TimestampError::BeforeEpoch(millis));
        }
        u32::try_from(since_epoch / BLOCK_INTERVAL_MS)
            .map(Self)
            .map_err(|_| TimestampError::Overflow(u32::MAX))
    }

    pub fn to_unix_millis(&self) -> i64 {
        i64::from(self.0) * BLOCK_INTERVAL_MS + BLOCK_TIMESTAMP_EPOCH_MS
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.to_unix_millis())
    }

    /// The following slot.
    pub fn next(&self) -> Result<Self, TimestampError> {
        self.0.checked_add(1).map(Self).ok_or(TimestampError::Overflow(self.0))
    }
}

impl fmt::Display for BlockTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(time) => write!(f, "{}", time.format("%Y-%m-%dT%H:%M:%S%.3f")),
            None => write!(f, "slot {}", self.0),
        }
    }
}

impl<C> minicbor::Encode<C> for BlockTimestamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.u32(self.0)?.ok()
    }
}

impl<'a, C> minicbor::Decode<'a, C> for BlockTimestamp {
    fn decode(d: &mut minicbor::Decoder<'a>, _ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Self(d.u32()?))
    }
}
