//! Data models for scoped roles.
//!
//! This module contains the user document shapes and the typed query
//! vocabulary the service speaks to user stores.

mod group;
mod query;
mod user;

pub use group::{GroupKey, GroupKeyError};
pub use query::{
    FindOptions, GroupRoleMatch, IdMatch, Projection, QueryOptions, ReadPreference, RoleMatch,
    RolesUpdate, SortDirection, SortKey, UpdateOptions, UserFilter,
};
pub use user::{RoleSelection, RoleSet, RolesField, UserRecord, UserRef, UserSelection};
