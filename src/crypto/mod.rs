//! Cryptography module - SHA-256d and scrypt hashing, Merkle trees

mod hash;
mod merkle;

pub use hash::*;
pub use merkle::*;
