//! Local durable store. The only persistence layer: everything above it is
//! stateless business logic operating on data read/written through here.

pub mod migration;
pub mod store;

use serde::{Deserialize, Serialize};

pub use store::LocalStore;

/// What to do when a store file is present but cannot be decoded. An absent
/// file is always treated as an empty collection and never consults this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CorruptFilePolicy {
    /// Degrade to an empty collection, logging a warning. Matches the
    /// cache-like behavior expected in production.
    #[default]
    Ignore,
    /// Surface a `StorageError::CorruptFile`. The right choice for tests
    /// and for deployments that treat the store as authoritative.
    Fail,
}
