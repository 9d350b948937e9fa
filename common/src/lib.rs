// DPoS common library - main library exports

pub mod block;
pub mod configuration;
pub mod crypto;
pub mod hash;
pub mod merkle;
pub mod name;
pub mod params;
pub mod schedule;
pub mod timestamp;

// Flattened re-exports
pub use self::block::*;
pub use self::configuration::ForkDatabaseConfig;
pub use self::crypto::{CryptoError, PrivateKey, PublicKey, Signature};
pub use self::hash::{Digest, Hash};
pub use self::merkle::IncrementalMerkle;
pub use self::name::{AccountName, NameError};
pub use self::schedule::{ProducerKey, ProducerSchedule};
pub use self::timestamp::{BlockTimestamp, TimestampError};
