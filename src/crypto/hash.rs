//! SHA-256d and scrypt hashing
//!
//! Block identity, transaction ids and merkle nodes use double SHA-256.
//! Proof of work is checked against the scrypt hash of the header.

use bitcoin::consensus::{encode, Decodable, Encodable};
use bitcoin::hashes::Hash as _;
use bitcoin::{io, Txid};
use scrypt::{scrypt, Params};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

/// 32-byte hash output
///
/// Bytes are stored in wire (little-endian) order. Hex conversion uses the
/// conventional reversed display order, so a hash with leading zero bits
/// prints with leading zeros.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Create a zero hash (the "null" hash)
    pub const fn zero() -> Self {
        Hash([0u8; 32])
    }

    /// Parse a hash from its display (byte-reversed) hex form
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex, &mut bytes)?;
        bytes.reverse();
        Ok(Hash(bytes))
    }

    /// Display (byte-reversed) hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.reversed().0)
    }

    /// Get as bytes in wire order
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The same bytes in reverse order
    pub fn reversed(&self) -> Self {
        let mut bytes = self.0;
        bytes.reverse();
        Hash(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Txid> for Hash {
    fn from(txid: Txid) -> Self {
        Hash(txid.to_byte_array())
    }
}

impl Encodable for Hash {
    fn consensus_encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        self.0.consensus_encode(writer)
    }
}

impl Decodable for Hash {
    fn consensus_decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, encode::Error> {
        Ok(Hash(Decodable::consensus_decode(reader)?))
    }
}

/// Double SHA-256 of arbitrary bytes
pub fn sha256d(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    Hash(second.into())
}

/// Hash two hashes together (for Merkle tree)
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(&left.0);
    data[32..].copy_from_slice(&right.0);
    sha256d(&data)
}

/// Scrypt parameters of the proof-of-work hash: N=1024, r=1, p=1, 32-byte output
fn pow_params() -> &'static Params {
    static PARAMS: OnceLock<Params> = OnceLock::new();
    PARAMS.get_or_init(|| Params::new(10, 1, 1, 32).expect("N=1024 r=1 p=1 is a valid parameter set"))
}

/// Scrypt proof-of-work hash, header bytes as password and salt
pub fn scrypt_pow_hash(data: &[u8]) -> Hash {
    let mut out = [0u8; 32];
    scrypt(data, data, pow_params(), &mut out).expect("32-byte output is within scrypt limits");
    Hash(out)
}
