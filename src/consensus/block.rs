//! Block header structures
//!
//! A [`BaseHeader`] is the plain 80-byte header. A [`BlockHeader`] is a base
//! header plus the optional AuxPoW payload that follows it on the wire when
//! the version carries the AuxPoW flag. The parent header embedded in an
//! AuxPoW is always a base header, so the types are not recursive.

use bitcoin::consensus::{encode, Decodable, Encodable};
use bitcoin::io;
use crate::consensus::{version, AuxPow};
use crate::crypto::{scrypt_pow_hash, sha256d, Hash};

/// Malformed wire bytes: truncated data, oversized or non-canonical
/// counts, or bytes left over after a header
pub type FormatError = encode::Error;

/// Block header without AuxPoW information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseHeader {
    /// Overloaded version: low bits, AuxPoW flag and chain ID
    pub version: i32,
    /// Hash of the previous block
    pub prev_hash: Hash,
    /// Merkle root of all transactions
    pub merkle_root: Hash,
    /// Block timestamp (seconds since Unix epoch)
    pub time: u32,
    /// Difficulty target (compact representation)
    pub bits: u32,
    /// Nonce used for PoW
    pub nonce: u32,
}

impl BaseHeader {
    /// Create a new base header
    pub fn new(
        version: i32,
        prev_hash: Hash,
        merkle_root: Hash,
        time: u32,
        bits: u32,
        nonce: u32,
    ) -> Self {
        Self {
            version,
            prev_hash,
            merkle_root,
            time,
            bits,
            nonce,
        }
    }

    /// Block identity: double SHA-256 of the 80 serialized bytes
    pub fn hash(&self) -> Hash {
        sha256d(&encode::serialize(self))
    }

    /// Proof-of-work hash: scrypt of the 80 serialized bytes
    pub fn pow_hash(&self) -> Hash {
        scrypt_pow_hash(&encode::serialize(self))
    }

    pub fn chain_id(&self) -> u32 {
        version::chain_id(self.version)
    }

    pub fn has_auxpow_flag(&self) -> bool {
        version::has_auxpow(self.version)
    }

    pub fn is_legacy(&self) -> bool {
        version::is_legacy(self.version)
    }

    /// A header with zero bits is treated as unset
    pub fn is_null(&self) -> bool {
        self.bits == 0
    }
}

impl Encodable for BaseHeader {
    fn consensus_encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let mut len = self.version.consensus_encode(writer)?;
        len += self.prev_hash.consensus_encode(writer)?;
        len += self.merkle_root.consensus_encode(writer)?;
        len += self.time.consensus_encode(writer)?;
        len += self.bits.consensus_encode(writer)?;
        len += self.nonce.consensus_encode(writer)?;
        Ok(len)
    }
}

impl Decodable for BaseHeader {
    fn consensus_decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, encode::Error> {
        Ok(Self {
            version: Decodable::consensus_decode(reader)?,
            prev_hash: Decodable::consensus_decode(reader)?,
            merkle_root: Decodable::consensus_decode(reader)?,
            time: Decodable::consensus_decode(reader)?,
            bits: Decodable::consensus_decode(reader)?,
            nonce: Decodable::consensus_decode(reader)?,
        })
    }
}

/// Full block header, possibly merge-mined
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockHeader {
    pub base: BaseHeader,
    /// Present exactly when `base.version` carries the AuxPoW flag
    pub auxpow: Option<Box<AuxPow>>,
}

impl BlockHeader {
    /// Header without AuxPoW
    pub fn new(base: BaseHeader) -> Self {
        Self { base, auxpow: None }
    }

    /// Attach an AuxPoW payload and set the version flag accordingly
    pub fn with_auxpow(mut base: BaseHeader, auxpow: AuxPow) -> Self {
        base.version = version::with_auxpow_flag(base.version, true);
        Self {
            base,
            auxpow: Some(Box::new(auxpow)),
        }
    }

    /// Replace (or remove) the payload, keeping the flag consistent
    pub fn set_auxpow(&mut self, auxpow: Option<AuxPow>) {
        self.base.version = version::with_auxpow_flag(self.base.version, auxpow.is_some());
        self.auxpow = auxpow.map(Box::new);
    }

    /// Reset to an all-zero header without AuxPoW
    pub fn set_null(&mut self) {
        *self = Self::default();
    }

    pub fn version(&self) -> i32 {
        self.base.version
    }

    pub fn time(&self) -> u32 {
        self.base.time
    }

    pub fn bits(&self) -> u32 {
        self.base.bits
    }

    pub fn chain_id(&self) -> u32 {
        self.base.chain_id()
    }

    /// The block hash covers only the base header, never the AuxPoW
    pub fn hash(&self) -> Hash {
        self.base.hash()
    }

    pub fn pow_hash(&self) -> Hash {
        self.base.pow_hash()
    }
}

impl Encodable for BlockHeader {
    fn consensus_encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let mut len = self.base.consensus_encode(writer)?;
        if let Some(auxpow) = &self.auxpow {
            len += auxpow.consensus_encode(writer)?;
        }
        Ok(len)
    }
}

impl Decodable for BlockHeader {
    fn consensus_decode_from_finite_reader<R: io::Read + ?Sized>(
        reader: &mut R,
    ) -> Result<Self, encode::Error> {
        let base = BaseHeader::consensus_decode(reader)?;
        let auxpow = if base.has_auxpow_flag() {
            Some(Box::new(AuxPow::consensus_decode_from_finite_reader(reader)?))
        } else {
            None
        };
        Ok(Self { base, auxpow })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BASE_HEADER_SIZE;
    use bitcoin::consensus::encode::{deserialize, serialize, serialize_hex};

    fn genesis() -> BaseHeader {
        BaseHeader::new(
            1,
            Hash::zero(),
            Hash::from_hex("5b2a3f53f605d62c53e62932dac6925e3d74afa5a4b459745c36d42d0ed26a69").unwrap(),
            1386325540,
            0x1e0ffff0,
            99943,
        )
    }

    #[test]
    fn test_genesis_header() {
        let header = genesis();
        assert_eq!(
            header.hash().to_hex(),
            "1a91e3dace36e2be3bf030a65679fe821aa1d6ef92e7c9902eb318182c355691"
        );
        assert_eq!(
            header.pow_hash().to_hex(),
            "0000026f3f7874ca0c251314eaed2d2fcf83d7da3acfaacf59417d485310b448"
        );
        assert_eq!(
            serialize_hex(&header),
            concat!(
                "0100000000000000000000000000000000000000000000000000000000000000",
                "00000000696ad20e2dd4365c7459b4a4a5af743d5e92c6da3229e6532cd605f6",
                "533f2a5b24a6a152f0ff0f1e67860100",
            )
        );
    }

    #[test]
    fn test_block_145000_header() {
        let header = BaseHeader::new(
            2,
            Hash::from_hex("919a380db4b45eb97abb131633d87ff690387ebe03ac76690da3f4d681400558").unwrap(),
            Hash::from_hex("316614dcd65aa75888cfe1ebb2190740bd8d1fc3e30a0c1952062740b1419c33").unwrap(),
            1395094679,
            0x1b499dfd,
            1200826624,
        );
        assert!(header.is_legacy());
        assert_eq!(
            header.hash().to_hex(),
            "cc47cae70d7c5c92828d3214a266331dde59087d4a39071fa76ddfff9b7bde72"
        );
        assert_eq!(
            header.pow_hash().to_hex(),
            "00000000002dfb87dd0d1b359eac948f33e91f87d586d36c497df2b08db7eb8a"
        );
        let bytes = serialize(&header);
        assert_eq!(deserialize::<BaseHeader>(&bytes).unwrap(), header);
    }

    #[test]
    fn test_first_merge_mined_header_hashes() {
        // Block 371337: the header itself carries no proof of work
        let header = BaseHeader::new(
            0x00620102,
            Hash::from_hex("46a8b109fb016fa41abd17a19186ca78d39c60c020c71fcd2690320d47036f0d").unwrap(),
            Hash::from_hex("ee27b8fb782a5bfb99c975f0d4686440b9af9e16846603e5f2830e0b6fbf158a").unwrap(),
            1410464577,
            0x1b364184,
            0,
        );
        assert!(header.has_auxpow_flag());
        assert_eq!(header.chain_id(), 0x62);
        assert_eq!(
            header.hash().to_hex(),
            "60323982f9c5ff1b5a954eac9dc1269352835f47c2c5222691d80f0d50dcf053"
        );
        assert_eq!(
            header.pow_hash().to_hex(),
            "2486dafe34a0258425fbf7dd0c63b70f10c5803db63e9a61a1af5d2a2fc39146"
        );
    }

    #[test]
    fn test_header_without_flag_has_no_payload() {
        let header = BlockHeader::new(genesis());
        let bytes = serialize(&header);
        assert_eq!(bytes.len(), BASE_HEADER_SIZE);
        let decoded: BlockHeader = deserialize(&bytes).unwrap();
        assert!(decoded.auxpow.is_none());
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_null_auxpow_header_decodes() {
        let header = BlockHeader::with_auxpow(BaseHeader::default(), AuxPow::default());
        let bytes = serialize(&header);
        assert_eq!(&bytes[..4], &[0, 1, 0, 0]);
        assert_eq!(bytes.len(), BASE_HEADER_SIZE + serialize(&AuxPow::default()).len());

        let mut header: BlockHeader = deserialize(&bytes).unwrap();
        assert!(version::has_auxpow(header.version()));
        assert_eq!(header.auxpow.as_deref(), Some(&AuxPow::default()));
        assert_eq!(serialize(&header), bytes);

        header.set_null();
        assert!(header.base.is_null());
        assert!(!version::has_auxpow(header.version()));
        assert!(header.auxpow.is_none());
    }

    #[test]
    fn test_flag_without_payload_is_format_error() {
        let mut base = genesis();
        base.version = version::with_auxpow_flag(base.version, true);
        let bytes = serialize(&base);
        assert_eq!(bytes.len(), BASE_HEADER_SIZE);
        assert!(matches!(deserialize::<BlockHeader>(&bytes), Err(FormatError::Io(_))));
    }

    #[test]
    fn test_payload_without_flag_leaves_trailing_bytes() {
        let mut header = BlockHeader::new(genesis());
        header.auxpow = Some(Box::new(AuxPow::default()));
        let bytes = serialize(&header);
        assert!(matches!(deserialize::<BlockHeader>(&bytes), Err(FormatError::ParseFailed(_))));
    }

    #[test]
    fn test_set_auxpow_tracks_flag() {
        let mut header = BlockHeader::new(genesis());
        header.set_auxpow(Some(AuxPow::default()));
        assert!(version::has_auxpow(header.version()));
        header.set_auxpow(None);
        assert!(!version::has_auxpow(header.version()));
        assert_eq!(header.version(), 1);
    }

    #[test]
    fn test_truncated_header_rejected() {
        let bytes = serialize(&genesis());
        assert!(deserialize::<BaseHeader>(&bytes[..79]).is_err());
    }
}
