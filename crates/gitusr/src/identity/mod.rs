//! Identity model: ids, records, listing views and editable fields.

pub mod record;

pub use record::{is_valid_email, Identity, IdentityField, IdentityId, ListedIdentity};
pub(crate) use record::IdentityRecord;
