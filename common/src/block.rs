//! Block identifiers, headers and signed blocks

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::{
    crypto::Signature, declare_hash_newtype, hash::Digest, merkle::merkle, name::AccountName,
    schedule::ProducerSchedule, timestamp::BlockTimestamp,
};

declare_hash_newtype!(
    /// Block id: the header digest with the block number in its first four
    /// bytes, big-endian.
    BlockId,
    32
);

declare_hash_newtype!(TransactionId, 32);

impl BlockId {
    pub fn from_parts(block_num: u32, digest: Digest) -> Self {
        let mut bytes = digest.into_inner();
        bytes[..4].copy_from_slice(&block_num.to_be_bytes());
        Self::from(bytes)
    }

    pub fn block_num(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

#[serde_as]
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, minicbor::Encode, minicbor::Decode,
)]
pub struct Extension {
    #[n(0)]
    pub kind: u16,

    #[serde_as(as = "Hex")]
    #[cbor(n(1), with = "minicbor::bytes")]
    pub data: Vec<u8>,
}

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
pub struct BlockHeader {
    #[n(0)]
    pub timestamp: BlockTimestamp,

    #[n(1)]
    pub producer: AccountName,

    /// Number of prior blocks this block confirms.
    #[n(2)]
    pub confirmed: u16,

    #[n(3)]
    pub previous: BlockId,

    #[n(4)]
    pub transaction_mroot: Digest,

    #[n(5)]
    pub action_mroot: Digest,

    #[n(6)]
    pub schedule_version: u32,

    #[n(7)]
    pub new_producers: Option<ProducerSchedule>,

    #[n(8)]
    pub header_extensions: Vec<Extension>,
}

impl BlockHeader {
    pub fn digest(&self) -> Digest {
        Digest::of_encoded(self)
    }

    pub fn block_num(&self) -> u32 {
        self.previous.block_num().saturating_add(1)
    }

    pub fn block_id(&self) -> BlockId {
        BlockId::from_parts(self.block_num(), self.digest())
    }
}

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
pub struct SignedBlockHeader {
    #[n(0)]
    pub header: BlockHeader,

    #[n(1)]
    pub producer_signature: Signature,
}

impl SignedBlockHeader {
    pub fn block_id(&self) -> BlockId {
        self.header.block_id()
    }

    pub fn block_num(&self) -> u32 {
        self.header.block_num()
    }
}

/// A producer's BFT confirmation of a block, signed over the block's
/// signing digest.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, minicbor::Encode, minicbor::Decode,
)]
pub struct HeaderConfirmation {
    #[n(0)]
    pub block_id: BlockId,

    #[n(1)]
    pub producer: AccountName,

    #[n(2)]
    pub producer_signature: Signature,
}

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    minicbor::Encode,
    minicbor::Decode,
)]
#[cbor(index_only)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    #[n(0)]
    Executed,
    #[n(1)]
    SoftFail,
    #[n(2)]
    HardFail,
    #[n(3)]
    Delayed,
    #[n(4)]
    Expired,
}

/// Receipt of a transaction included in a block; the payload is opaque here.
#[serde_as]
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, minicbor::Encode, minicbor::Decode,
)]
pub struct TransactionReceipt {
    #[n(0)]
    pub status: TransactionStatus,

    #[n(1)]
    pub cpu_usage_us: u32,

    #[n(2)]
    pub net_usage_words: u32,

    #[serde_as(as = "Hex")]
    #[cbor(n(3), with = "minicbor::bytes")]
    pub trx: Vec<u8>,
}

impl TransactionReceipt {
    pub fn digest(&self) -> Digest {
        Digest::of_encoded(self)
    }
}

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
pub struct SignedBlock {
    #[n(0)]
    pub signed_header: SignedBlockHeader,

    #[n(1)]
    pub transactions: Vec<TransactionReceipt>,

    #[n(2)]
    pub block_extensions: Vec<Extension>,
}

impl SignedBlock {
    pub fn new(signed_header: SignedBlockHeader) -> Self {
        Self {
            signed_header,
            ..Self::default()
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.signed_header.header
    }

    pub fn block_id(&self) -> BlockId {
        self.signed_header.block_id()
    }

    pub fn block_num(&self) -> u32 {
        self.signed_header.block_num()
    }

    pub fn calculate_transaction_mroot(&self) -> Digest {
        merkle(self.transactions.iter().map(TransactionReceipt::digest).collect())
    }
}

/// Transaction data carried alongside a block for the controller.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub id: TransactionId,
    pub signed_id: TransactionId,
    #[serde_as(as = "Hex")]
    pub packed_trx: Vec<u8>,
    pub accepted: bool,
    pub implicit: bool,
    pub scheduled: bool,
}

impl TransactionMetadata {
    pub fn new(packed_trx: Vec<u8>, signatures: &[Signature]) -> Self {
        let id = Digest::sha256(&packed_trx);
        let signed_id = signatures
            .iter()
            .fold(id, |acc, sig| Digest::sha256_pair(&acc, &Digest::sha256(sig.to_string())));
        Self {
            id: id.into(),
            signed_id: signed_id.into(),
            packed_trx,
            accepted: false,
            implicit: false,
            scheduled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;

    fn header_after(previous: BlockId) -> BlockHeader {
        BlockHeader {
            timestamp: BlockTimestamp::new(10),
            producer: "eosio".parse().unwrap(),
            previous,
            ..BlockHeader::default()
        }
    }

    #[test]
    fn test_block_id_embeds_block_number() {
        let genesis = header_after(BlockId::default());
        assert_eq!(genesis.block_num(), 1);
        assert_eq!(genesis.block_id().block_num(), 1);

        let second = header_after(genesis.block_id());
        assert_eq!(second.block_num(), 2);
        assert_eq!(second.block_id().block_num(), 2);
        assert_eq!(second.block_id()[4..], second.digest()[4..]);
    }

    #[test]
    fn test_block_num_of_known_id() {
        let id: BlockId =
            "00000043df9347b6d053a03a78499bc420acb05c5c3bec6acbd8d37a68b3f195".parse().unwrap();
        assert_eq!(id.block_num(), 0x43);
    }

    #[test]
    fn test_digest_ignores_signature() {
        let header = header_after(BlockId::default());
        let signed = SignedBlockHeader {
            header: header.clone(),
            producer_signature: PrivateKey::from_seed([1; 32]).sign(&header.digest()),
        };
        assert_eq!(signed.block_id(), header.block_id());
    }

    #[test]
    fn test_header_cbor_round_trip() {
        let mut header = header_after(BlockId::default());
        header.header_extensions.push(Extension {
            kind: 1,
            data: vec![1, 2, 3],
        });
        let bytes = minicbor::to_vec(&header).unwrap();
        let decoded: BlockHeader = minicbor::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_transaction_mroot() {
        let mut block = SignedBlock::default();
        assert_eq!(block.calculate_transaction_mroot(), Digest::default());

        let receipt = TransactionReceipt {
            status: TransactionStatus::Executed,
            cpu_usage_us: 100,
            net_usage_words: 4,
            trx: vec![0xaa; 16],
        };
        block.transactions.push(receipt.clone());
        assert_eq!(block.calculate_transaction_mroot(), receipt.digest());
    }

    #[test]
    fn test_transaction_metadata_ids() {
        let unsigned = TransactionMetadata::new(vec![1, 2, 3], &[]);
        assert_eq!(unsigned.id, unsigned.signed_id);

        let signature = PrivateKey::from_seed([3; 32]).sign(&Digest::sha256([1u8, 2, 3]));
        let signed = TransactionMetadata::new(vec![1, 2, 3], &[signature]);
        assert_eq!(signed.id, unsigned.id);
        assert_ne!(signed.signed_id, unsigned.signed_id);
    }
}
