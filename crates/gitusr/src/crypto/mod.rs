//! Cryptographic primitives for the identity store.
//!
//! This module provides:
//! - Master key providers (environment-derived or caller-supplied)
//! - Argon2id per-record key stretching
//! - ChaCha20-Poly1305 per-record envelopes
//! - Fresh salts and nonces from the OS random source

pub mod envelope;
pub mod kdf;
pub mod random;

pub use envelope::{open, seal, Envelope};
pub use kdf::{derive_record_key, EnvKeyProvider, FixedKeyProvider, KeyProvider, MasterKey};
