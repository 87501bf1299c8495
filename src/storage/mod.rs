//! Storage layer abstraction.
//!
//! User documents belong to the host application. This layer defines the
//! narrow store interface the role service needs and the backends that
//! implement it.

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod users;

pub use users::{
    DEFAULT_BATCH_SIZE, InMemoryUserStore, PageSource, SqliteUserStore, StoreBackendType,
    StoreError, StoreErrorKind, StoreResult, UserCursor, UserStore, UserStoreFactory,
};
