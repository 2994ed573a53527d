//! Hashing primitives for Rite.
//!
//! Provides domain-separated BLAKE3 hashing and the binary Merkle tree whose
//! root is used as a manifest fingerprint.
//!
//! All crypto operations wrap established libraries. No custom cryptography.

pub mod hasher;
pub mod merkle;

pub use hasher::ContentHasher;
pub use merkle::MerkleTree;
