//! Group keys for scoping role assignments.
//!
//! Every role a user holds lives inside a group (tenant, site, namespace).
//! Group names supplied by callers are canonicalized before they are used
//! as a key into a user's roles mapping:
//!
//! - surrounding whitespace is trimmed
//! - names may not be blank or start with `$`
//! - every `.` is rewritten to `_`, because stores address nested fields with
//!   dotted paths
//!
//! The last rule means `example.com` and `example_com` name the same group.
//!
//! # Example
//!
//! ```rust
//! use scoped_roles::models::GroupKey;
//!
//! let key = GroupKey::canonicalize(" example.k12.va.us ").unwrap();
//! assert_eq!(key.as_str(), "example_k12_va_us");
//! ```

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;

/// Reasons a raw group name cannot be turned into a [`GroupKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum GroupKeyError {
    /// No group name was supplied.
    #[error("Roles error: Invalid parameter 'group' expected 'string' type.")]
    Missing,

    /// The group name is whitespace only.
    #[error("Roles error: groups can not be empty")]
    Empty,

    /// The group name starts with the reserved `$` character.
    #[error("Roles error: groups can not start with '$'")]
    ReservedPrefix,
}

/// Canonical, validated group identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    /// Validates and canonicalizes a raw group name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, whitespace only, or starts
    /// with `$` after trimming.
    pub fn canonicalize(raw: &str) -> Result<Self, GroupKeyError> {
        if raw.is_empty() {
            return Err(GroupKeyError::Missing);
        }

        let trimmed = raw.trim();

        if trimmed.starts_with('$') {
            return Err(GroupKeyError::ReservedPrefix);
        }

        if trimmed.is_empty() {
            return Err(GroupKeyError::Empty);
        }

        Ok(Self(trimmed.replace('.', "_")))
    }

    /// Canonicalizes an optional group name, treating `None` as missing.
    ///
    /// # Errors
    ///
    /// Returns [`GroupKeyError::Missing`] for `None`, otherwise the same
    /// errors as [`GroupKey::canonicalize`].
    pub fn from_optional(raw: Option<&str>) -> Result<Self, GroupKeyError> {
        raw.map_or(Err(GroupKeyError::Missing), Self::canonicalize)
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key and returns the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for GroupKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for GroupKey {
    type Err = GroupKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::canonicalize(s)
    }
}
