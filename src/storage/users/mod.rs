//! User storage backends.
//!
//! The role service never owns user documents; it reads and updates them
//! through a [`UserStore`]. Two backends are provided:
//!
//! - **`SQLite`**: durable, one row per user with JSON-encoded roles
//! - **Memory**: non-persistent, for tests and development
//!
//! Both share the document semantics in `document`, so a filter, update, or
//! projection behaves the same whichever backend is selected.

mod cursor;
mod document;
mod memory;
mod sqlite;
mod traits;

pub use cursor::{DEFAULT_BATCH_SIZE, PageSource, UserCursor};
pub use memory::InMemoryUserStore;
pub use sqlite::SqliteUserStore;
pub use traits::{StoreError, StoreErrorKind, StoreResult, UserStore};

use crate::config::StoreSettings;
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Backend type for user storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackendType {
    /// `SQLite` database (default).
    #[default]
    Sqlite,
    /// Non-persistent in-process store.
    Memory,
}

impl StoreBackendType {
    /// Parses a backend name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "memory" | "in-memory" | "in_memory" => Some(Self::Memory),
            _ => None,
        }
    }

    /// Returns the backend name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

/// Factory for creating user stores.
pub struct UserStoreFactory;

impl UserStoreFactory {
    /// Creates the store described by `settings`.
    ///
    /// The store is not initialized; pass it to
    /// [`RoleAssignmentService::initialize`](crate::services::RoleAssignmentService::initialize).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No database path is configured and none can be derived
    /// - The database cannot be opened
    pub fn create(settings: &StoreSettings) -> Result<Arc<dyn UserStore>> {
        match settings.backend {
            StoreBackendType::Memory => Ok(Self::create_in_memory()),
            StoreBackendType::Sqlite => {
                let path = settings
                    .path
                    .clone()
                    .or_else(SqliteUserStore::default_path)
                    .ok_or_else(|| Error::OperationFailed {
                        operation: "create_user_store".to_string(),
                        cause: "Could not determine database path".to_string(),
                    })?;
                Self::create_with_path(path)
            },
        }
    }

    /// Creates a `SQLite` store at an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn create_with_path(path: PathBuf) -> Result<Arc<dyn UserStore>> {
        Ok(Arc::new(SqliteUserStore::open(path)?))
    }

    /// Creates a non-persistent store (useful for testing).
    #[must_use]
    pub fn create_in_memory() -> Arc<dyn UserStore> {
        Arc::new(InMemoryUserStore::new())
    }
}
