//! User store trait definitions.
//!
//! Defines the interface the role service uses to read and update user
//! documents. Backends report failures as [`StoreError`], a kind plus the
//! store's own message text, so callers can recognize specific conflicts.

use std::fmt;

use thiserror::Error as ThisError;

use crate::models::{FindOptions, RolesUpdate, UpdateOptions, UserFilter, UserRecord};

use super::cursor::UserCursor;

/// Category of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// A write was rejected.
    Write,
    /// A read failed.
    Read,
    /// The store could not be reached or locked.
    Connection,
    /// Stored data or schema could not be prepared or decoded.
    Schema,
}

impl StoreErrorKind {
    /// Returns the error name reported alongside the message.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Write => "WriteError",
            Self::Read => "ReadError",
            Self::Connection => "ConnectionError",
            Self::Schema => "SchemaError",
        }
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structured failure reported by a [`UserStore`].
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{kind}: {message}")]
pub struct StoreError {
    /// Failure category.
    pub kind: StoreErrorKind,
    /// Store-specific message text.
    pub message: String,
}

impl StoreError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a write error.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Write, message)
    }

    /// Creates a read error.
    #[must_use]
    pub fn read(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Read, message)
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Connection, message)
    }

    /// Creates a schema error.
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Schema, message)
    }

    /// Returns the error name (`WriteError`, `ReadError`, ...).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Trait for user document stores.
///
/// Every call is a single store-level operation; an update applies to all
/// matching documents or fails as a whole. Implementations must be
/// thread-safe (`Send + Sync`).
pub trait UserStore: Send + Sync {
    /// Prepares the store for use (schema, indexes).
    ///
    /// Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be prepared.
    fn initialize(&self) -> StoreResult<()>;

    /// Inserts a new user document.
    ///
    /// # Errors
    ///
    /// Returns a write error if a user with the same id exists.
    fn insert(&self, user: UserRecord) -> StoreResult<()>;

    /// Returns the first user matching `filter`, shaped by `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_one(&self, filter: &UserFilter, options: &FindOptions)
    -> StoreResult<Option<UserRecord>>;

    /// Returns a cursor over all users matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find(&self, filter: &UserFilter, options: &FindOptions) -> StoreResult<UserCursor>;

    /// Applies `update` to the users matching `filter`.
    ///
    /// # Returns
    ///
    /// The number of matched users.
    ///
    /// # Errors
    ///
    /// Returns a write error if the update is incompatible with a matched
    /// user's roles field; no user is modified in that case.
    fn update(
        &self,
        filter: &UserFilter,
        update: &RolesUpdate,
        options: UpdateOptions,
    ) -> StoreResult<usize>;
}
