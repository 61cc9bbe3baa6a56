//! SSH private key handling: validation, fingerprinting and recovery.

pub mod recovery;
pub mod validate;

pub use recovery::{IntegrityReport, KeyRecovery};
pub use validate::{fingerprint, normalize, validate, KeyCheck};
