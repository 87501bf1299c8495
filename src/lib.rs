//! # Scoped Roles
//!
//! Group-scoped role assignment for user records owned by a host application.
//!
//! Each user carries a roles field that is either a flat list of role names
//! (ungrouped, legacy) or a mapping from group key to role names. This crate
//! grants, replaces, revokes, and queries those roles through a narrow
//! [`UserStore`] interface and never creates or deletes users itself.
//!
//! ## Features
//!
//! - Group keys are canonicalized (trimmed, `.` rewritten to `_`, no leading `$`)
//! - Add, set, and remove are single atomic store updates across all matched users
//! - Updates that would mix grouped and ungrouped roles fail with a clear error
//! - Pluggable stores (in-memory, `SQLite`)
//!
//! ## Example
//!
//! ```rust
//! use scoped_roles::{RoleAssignmentService, UserRecord, UserStoreFactory};
//!
//! let store = UserStoreFactory::create_in_memory();
//! store.insert(UserRecord::new("eve"))?;
//!
//! let roles = RoleAssignmentService::initialize(store)?;
//! roles.add_roles_to_users("eve", ["admin", "user"], "group1")?;
//!
//! assert_eq!(roles.roles_for_user("eve", "group1")?, vec!["admin", "user"]);
//! assert!(!roles.user_has_any_role("eve", "admin", "group2")?);
//! # Ok::<(), scoped_roles::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::{RolesConfig, StoreSettings};
pub use models::{
    GroupKey, GroupKeyError, QueryOptions, RoleSelection, RolesField, UserRecord, UserRef,
    UserSelection,
};
pub use services::{RoleAssignmentService, RolesPublication};
pub use storage::{StoreError, StoreErrorKind, UserCursor, UserStore, UserStoreFactory};

/// Error type for role operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidGroup` | Group argument blank, whitespace only, or starting with `$` |
/// | `MissingUsers` | `remove_roles_from_users` called without a user |
/// | `MissingRoles` | A mutation called without a role |
/// | `MixedRoleMode` | The store rejects an update mixing grouped and ungrouped roles |
/// | `Store` | Any other store failure, passed through unchanged |
/// | `InvalidInput` | Configuration names an unknown value |
/// | `OperationFailed` | Config or log file I/O fails, store path cannot be derived |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The group argument cannot be used as a group key.
    ///
    /// Always raised before any store call.
    #[error(transparent)]
    InvalidGroup(#[from] GroupKeyError),

    /// No user was supplied.
    #[error("Missing 'users' param")]
    MissingUsers,

    /// No role was supplied.
    #[error("Missing 'roles' param")]
    MissingRoles,

    /// An update addressed a group inside a user's ungrouped roles, or the
    /// reverse.
    ///
    /// Only known after the store rejects the update.
    #[error("Roles error: Can't mix grouped and non-grouped roles for same user")]
    MixedRoleMode,

    /// The store failed for any other reason.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for role operations.
pub type Result<T> = std::result::Result<T, Error>;
