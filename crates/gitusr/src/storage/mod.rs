//! Persistence for the identity store.
//!
//! # Modules
//!
//! - [`store_file`]: on-disk JSON format and atomic owner-only writes.
//! - [`identity_store`]: the decrypted aggregate and its mutations.

pub mod identity_store;
pub mod store_file;

pub use identity_store::{Added, IdentityStore, LoadReport, SkippedRecord, StoreState};
pub use store_file::StoreFile;
