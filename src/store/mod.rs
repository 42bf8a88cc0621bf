//! Record persistence.
//!
//! [`RecordStore`] is the only way the rest of the service reaches stored
//! records. Two production backends implement it, [`MongoStore`] and
//! [`FirestoreStore`]; [`connect`] picks one from configuration once at
//! startup and the handlers hold it as `Arc<dyn RecordStore>` for the life
//! of the process. [`MemoryStore`] implements the same contract in process
//! memory for tests and local experiments and is never chosen by
//! configuration.
//!
//! Not-found is not an error: lookups by id return `Ok(None)`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, DatabaseConfig};
use crate::record::{NewRecord, Record, RecordPatch};

pub mod firestore;
mod memory;
mod mongo;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Name of the collection records live in, on every backend.
pub const COLLECTION: &str = "datas";

/// Failures a store operation can report.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The input is missing a required field or could not be parsed.
    #[error("{0}")]
    Validation(String),

    /// The backend failed or could not be reached.
    #[error("{0}")]
    Backend(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// The storage backends a deployment can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    MongoDb,
    Firestore,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::MongoDb => "mongodb",
            Backend::Firestore => "firestore",
        }
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mongodb" | "document-orm" => Ok(Backend::MongoDb),
            "firestore" | "managed-document" => Ok(Backend::Firestore),
            other => Err(ConfigError::UnknownBackend(other.to_owned())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CRUD over Data records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Validates `record`, assigns it an id and persists it.
    async fn create(&self, record: NewRecord) -> Result<Record, StoreError>;

    /// All records, or only those whose `type` equals `kind` exactly.
    /// The filter is evaluated by the backend. Order is backend-defined.
    async fn list_by_type(&self, kind: Option<&str>) -> Result<Vec<Record>, StoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Record>, StoreError>;

    /// Writes the supplied fields and returns the record as it is afterwards.
    /// Returns `None`, creating nothing, when no record has `id`.
    async fn update_by_id(&self, id: &str, patch: RecordPatch) -> Result<Option<Record>, StoreError>;

    /// Removes the record and returns it as it was just before deletion.
    async fn delete_by_id(&self, id: &str) -> Result<Option<Record>, StoreError>;

    /// Cheap round trip to the backend.
    async fn ping(&self) -> Result<(), StoreError>;

    fn backend(&self) -> Option<Backend>;
}

/// Builds the store selected by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn RecordStore>, StoreError> {
    let store: Arc<dyn RecordStore> = match config {
        DatabaseConfig::MongoDb(mongo) => Arc::new(MongoStore::connect(mongo).await?),
        DatabaseConfig::Firestore(firestore) => Arc::new(FirestoreStore::new(firestore)?),
    };
    info!(backend = %config.backend(), "{} connection: SUCCESS", config.backend());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_accepts_names_and_aliases() {
        assert_eq!("mongodb".parse::<Backend>().unwrap(), Backend::MongoDb);
        assert_eq!("document-orm".parse::<Backend>().unwrap(), Backend::MongoDb);
        assert_eq!("firestore".parse::<Backend>().unwrap(), Backend::Firestore);
        assert_eq!("managed-document".parse::<Backend>().unwrap(), Backend::Firestore);
    }

    #[test]
    fn backend_is_case_sensitive() {
        assert!(matches!(
            "MongoDB".parse::<Backend>(),
            Err(ConfigError::UnknownBackend(name)) if name == "MongoDB"
        ));
    }
}
