//! Ed25519 keys and producer signatures
//!
//! Ed25519 has no public key recovery, so a producer [`Signature`] carries
//! the signer's [`PublicKey`] next to the signature bytes. "Recovering" the
//! signer verifies the signature against that key and hands it back; callers
//! then compare it with the key they expect.
use cryptoxide::ed25519::{self, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{convert::TryFrom, fmt, str::FromStr};
use thiserror::Error;

use crate::hash::Digest;

const SEED_LENGTH: usize = 32;
const KEYPAIR_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid size, expecting {expected} bytes, got {got}")]
    InvalidSize { expected: usize, got: usize },

    #[error("signature does not verify against its signing key")]
    InvalidSignature,

    #[error("block is not signed")]
    MissingSignature,
}

/// Ed25519 public key, the block signing key of a producer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; Self::SIZE]);

/// Ed25519 signing key derived from a 32 byte seed.
#[derive(Clone)]
pub struct PrivateKey {
    keypair: [u8; KEYPAIR_LENGTH],
    public: PublicKey,
}

/// Producer signature over a 32 byte digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    signer: PublicKey,
    bytes: [u8; SIGNATURE_LENGTH],
}

impl PublicKey {
    pub const SIZE: usize = PUBLIC_KEY_LENGTH;

    /// The all-zero key, never produced by a real key pair.
    pub const fn zero() -> Self {
        Self([0; Self::SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// verify the cryptographic [`Signature`] against the `message` and the
    /// [`PublicKey`] `self`.
    #[inline]
    pub fn verify<T>(&self, message: T, signature: &Signature) -> bool
    where
        T: AsRef<[u8]>,
    {
        ed25519::verify(message.as_ref(), &self.0, &signature.bytes)
    }
}

impl Default for PublicKey {
    fn default() -> Self {
        Self::zero()
    }
}

impl PrivateKey {
    pub fn from_seed(seed: [u8; SEED_LENGTH]) -> Self {
        let (keypair, public) = ed25519::keypair(&seed);
        Self {
            keypair,
            public: PublicKey(public),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn sign(&self, digest: &Digest) -> Signature {
        Signature {
            signer: self.public,
            bytes: ed25519::signature(digest.as_ref(), &self.keypair),
        }
    }
}

impl Signature {
    pub const SIZE: usize = PublicKey::SIZE + SIGNATURE_LENGTH;

    pub fn new(signer: PublicKey, bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self { signer, bytes }
    }

    /// The key this signature claims to be made with.
    pub fn signer(&self) -> &PublicKey {
        &self.signer
    }

    /// An empty signature is all zeroes, as carried by unsigned headers.
    pub fn is_empty(&self) -> bool {
        self.signer.is_zero() && self.bytes.iter().all(|b| *b == 0)
    }

    /// Recover the key that signed `digest`.
    pub fn recover(&self, digest: &Digest) -> Result<PublicKey, CryptoError> {
        if self.is_empty() {
            return Err(CryptoError::MissingSignature);
        }
        if self.signer.verify(digest, self) {
            Ok(self.signer)
        } else {
            Err(CryptoError::InvalidSignature)
        }
    }

    fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0; Self::SIZE];
        out[..PublicKey::SIZE].copy_from_slice(&self.signer.0);
        out[PublicKey::SIZE..].copy_from_slice(&self.bytes);
        out
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            signer: PublicKey::zero(),
            bytes: [0; SIGNATURE_LENGTH],
        }
    }
}

/* Format ****************************************************************** */

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_ref()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey<Ed25519>").field(&hex::encode(self.as_ref())).finish()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature<Ed25519>")
            .field("signer", &self.signer)
            .field("bytes", &hex::encode(self.bytes))
            .finish()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey").field("public", &self.public).finish_non_exhaustive()
    }
}

/* Conversion ************************************************************** */

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl From<[u8; Self::SIZE]> for PublicKey {
    fn from(bytes: [u8; Self::SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<PublicKey> for [u8; PublicKey::SIZE] {
    fn from(pk: PublicKey) -> Self {
        pk.0
    }
}

impl<'a> TryFrom<&'a [u8]> for PublicKey {
    type Error = CryptoError;
    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; Self::SIZE] = value.try_into().map_err(|_| CryptoError::InvalidSize {
            expected: Self::SIZE,
            got: value.len(),
        })?;
        Ok(Self(bytes))
    }
}

impl<'a> TryFrom<&'a [u8]> for Signature {
    type Error = CryptoError;
    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        if value.len() != Self::SIZE {
            return Err(CryptoError::InvalidSize {
                expected: Self::SIZE,
                got: value.len(),
            });
        }
        let signer = PublicKey::try_from(&value[..PublicKey::SIZE])?;
        let mut bytes = [0; SIGNATURE_LENGTH];
        bytes.copy_from_slice(&value[PublicKey::SIZE..]);
        Ok(Self { signer, bytes })
    }
}

impl FromStr for PublicKey {
    type Err = hex::FromHexError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut r = Self::zero();
        hex::decode_to_slice(s, &mut r.0)?;
        Ok(r)
    }
}

impl FromStr for Signature {
    type Err = hex::FromHexError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut raw = [0; Self::SIZE];
        hex::decode_to_slice(s, &mut raw)?;
        let mut r = Self::default();
        r.signer.0.copy_from_slice(&raw[..PublicKey::SIZE]);
        r.bytes.copy_from_slice(&raw[PublicKey::SIZE..]);
        Ok(r)
    }
}

/* Serde & CBOR ************************************************************ */

macro_rules! impl_hex_serde {
    ($Type:ty) => {
        impl Serialize for $Type {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $Type {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s: String = Deserialize::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_hex_serde!(PublicKey);
impl_hex_serde!(Signature);

impl<C> minicbor::Encode<C> for PublicKey {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(&self.0)?.ok()
    }
}

impl<'a, C> minicbor::Decode<'a, C> for PublicKey {
    fn decode(d: &mut minicbor::Decoder<'a>, _ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        PublicKey::try_from(d.bytes()?).map_err(|e| minicbor::decode::Error::message(e.to_string()))
    }
}

impl<C> minicbor::Encode<C> for Signature {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(&self.to_bytes())?.ok()
    }
}

impl<'a, C> minicbor::Decode<'a, C> for Signature {
    fn decode(d: &mut minicbor::Decoder<'a>, _ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        Signature::try_from(d.bytes()?).map_err(|e| minicbor::decode::Error::message(e.to_string()))
    }
}
