//! Consensus module - Headers, AuxPoW, proof of work and difficulty

pub mod compact;
pub mod version;
mod auxpow;
mod block;
mod coinbase;
mod difficulty;
mod params;
mod pow;
mod validation;

pub use auxpow::*;
pub use block::*;
pub use coinbase::*;
pub use difficulty::*;
pub use params::*;
pub use pow::*;
pub use validation::*;
