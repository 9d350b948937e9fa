use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::{fmt, ops::Deref, str::FromStr};

/// Data that is a cryptographic hash of `BYTES` long.
///
/// Generic wrapper around a fixed-size byte array providing hexadecimal
/// serde and `Display`, CBOR encoding via minicbor and conversions from the
/// usual byte containers.
///
/// # Examples
///
/// ```ignore
/// let digest: Hash<32> = "ad2b926aa8d86b1ed9dc70b47b48778c43a2406eabba236d81580286640f78d5"
///     .parse()
///     .unwrap();
/// assert_eq!(digest.to_string().len(), 64);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash<const BYTES: usize>([u8; BYTES]);

/// A SHA-256 output.
pub type Digest = Hash<32>;

impl<const BYTES: usize> Default for Hash<BYTES> {
    fn default() -> Self {
        Self::new([0u8; BYTES])
    }
}

// Implement Serialize/Deserialize manually since generic const arrays don't auto-derive
impl<const BYTES: usize> Serialize for Hash<BYTES> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de, const BYTES: usize> Deserialize<'de> for Hash<BYTES> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl<const BYTES: usize> Hash<BYTES> {
    /// Creates a new hash from a byte array.
    #[inline]
    pub const fn new(bytes: [u8; BYTES]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    #[inline]
    pub fn into_inner(self) -> [u8; BYTES] {
        self.0
    }

    /// True for the all-zero hash, used as the "no value" marker.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Hash<32> {
    /// SHA-256 of `data`.
    pub fn sha256(data: impl AsRef<[u8]>) -> Self {
        Self::new(Sha256::digest(data.as_ref()).into())
    }

    /// SHA-256 of the concatenation `left || right`.
    ///
    /// This is how a pair of digests is hashed everywhere in the chain:
    /// block root merkle nodes, signing digests and schedule hashes.
    pub fn sha256_pair(left: &Digest, right: &Digest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(left.0);
        hasher.update(right.0);
        Self::new(hasher.finalize().into())
    }

    /// SHA-256 of the canonical CBOR encoding of `value`.
    pub fn of_encoded<T: minicbor::Encode<()>>(value: &T) -> Self {
        // Encoding into a Vec cannot fail
        let bytes = minicbor::to_vec(value).unwrap_or_default();
        Self::sha256(bytes)
    }
}

impl<const BYTES: usize> From<[u8; BYTES]> for Hash<BYTES> {
    #[inline]
    fn from(bytes: [u8; BYTES]) -> Self {
        Self::new(bytes)
    }
}

impl<const BYTES: usize> TryFrom<&[u8]> for Hash<BYTES> {
    type Error = std::array::TryFromSliceError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let hash: [u8; BYTES] = value.try_into()?;
        Ok(Self::new(hash))
    }
}

impl<const BYTES: usize> TryFrom<Vec<u8>> for Hash<BYTES> {
    type Error = Vec<u8>;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        let hash: [u8; BYTES] = value.try_into()?;
        Ok(Self::new(hash))
    }
}

impl<const BYTES: usize> From<Hash<BYTES>> for [u8; BYTES] {
    fn from(hash: Hash<BYTES>) -> Self {
        hash.0
    }
}

impl<const BYTES: usize> AsRef<[u8]> for Hash<BYTES> {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const BYTES: usize> Deref for Hash<BYTES> {
    type Target = [u8; BYTES];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const BYTES: usize> fmt::Debug for Hash<BYTES> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(&format!("Hash<{BYTES}>")).field(&hex::encode(self)).finish()
    }
}

impl<const BYTES: usize> fmt::Display for Hash<BYTES> {
    /// Formats the hash as a lowercase hexadecimal string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self))
    }
}

impl<const BYTES: usize> FromStr for Hash<BYTES> {
    type Err = hex::FromHexError;

    /// Parses a hash from a hexadecimal string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hexadecimal or does not
    /// decode to exactly `BYTES` bytes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; BYTES];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self::new(bytes))
    }
}

impl<C, const BYTES: usize> minicbor::Encode<C> for Hash<BYTES> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(&self.0)?.ok()
    }
}

impl<'a, C, const BYTES: usize> minicbor::Decode<'a, C> for Hash<BYTES> {
    fn decode(
        d: &mut minicbor::Decoder<'a>,
        _ctx: &mut C,
    ) -> Result<Self, minicbor::decode::Error> {
        let bytes = d.bytes()?;
        if bytes.len() == BYTES {
            let mut hash = [0; BYTES];
            hash.copy_from_slice(bytes);
            Ok(Self::new(hash))
        } else {
            Err(minicbor::decode::Error::message("Invalid hash size"))
        }
    }
}

/// Declares a newtype wrapper around `Hash<SIZE>`.
///
/// The wrapper is a distinct type, so a `BlockId` can never be passed where
/// a `TransactionId` is expected even though both are 32-byte hashes.
///
/// # Examples
///
/// ```ignore
/// declare_hash_newtype!(BlockId, 32);
/// ```
#[macro_export]
macro_rules! declare_hash_newtype {
    ($(#[$meta:meta])* $name:ident, $size:expr) => {
        $(#[$meta])*
        #[derive(
            Default,
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($crate::hash::Hash<$size>);

        impl $name {
            pub const fn new(hash: $crate::hash::Hash<$size>) -> Self {
                Self(hash)
            }

            pub fn into_inner(self) -> $crate::hash::Hash<$size> {
                self.0
            }
        }

        impl From<$crate::hash::Hash<$size>> for $name {
            fn from(hash: $crate::hash::Hash<$size>) -> Self {
                Self(hash)
            }
        }

        impl From<[u8; $size]> for $name {
            fn from(bytes: [u8; $size]) -> Self {
                Self($crate::hash::Hash::new(bytes))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_ref()
            }
        }

        impl std::ops::Deref for $name {
            type Target = $crate::hash::Hash<$size>;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = hex::FromHexError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl<C> minicbor::Encode<C> for $name {
            fn encode<W: minicbor::encode::Write>(
                &self,
                e: &mut minicbor::Encoder<W>,
                ctx: &mut C,
            ) -> Result<(), minicbor::encode::Error<W::Error>> {
                minicbor::Encode::encode(&self.0, e, ctx)
            }
        }

        impl<'a, C> minicbor::Decode<'a, C> for $name {
            fn decode(
                d: &mut minicbor::Decoder<'a>,
                ctx: &mut C,
            ) -> Result<Self, minicbor::decode::Error> {
                Ok(Self(minicbor::Decode::decode(d, ctx)?))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        let digest: Digest =
            "0d8d00cdd4657ac84d82f0a56067634a7adfdf43da41cb534bcaa45060973d21".parse().unwrap();
        assert_eq!(digest[0], 0x0d);
    }

    #[test]
    #[should_panic]
    fn test_from_str_wrong_length() {
        let _digest: Digest = "0d8d00cdd465".parse().unwrap();
    }

    #[test]
    fn test_default_is_zero() {
        assert!(Digest::default().is_zero());
        assert!(!Digest::sha256(b"eos").is_zero());
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            Digest::sha256(b"eos").to_string(),
            "16149626b0365e04a9a52d02e17ca8aeb63680b9f5ee2ba334b0b1a38a833cfe"
        );
    }

    #[test]
    fn test_sha256_pair_is_concatenation() {
        let a = Digest::sha256(b"left");
        let b = Digest::sha256(b"right");
        let mut joined = a.to_vec();
        joined.extend_from_slice(b.as_ref());
        assert_eq!(Digest::sha256_pair(&a, &b), Digest::sha256(joined));
    }

    #[test]
    fn test_serde_uses_hex() {
        let digest = Digest::sha256(b"eos");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{digest}\""));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }
}
