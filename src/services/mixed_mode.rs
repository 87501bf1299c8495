//! Detection of grouped/ungrouped shape conflicts reported by a store.
//!
//! A user's roles field is either a list or a group mapping. When an update
//! addresses a group inside a list (or treats a mapping as a list), the store
//! rejects it with a write error whose wording varies between store versions.
//! Those failures are recognized by message substring and surfaced as
//! [`Error::MixedRoleMode`]; every other store failure passes through.
//!
//! Matching on another system's error text is fragile. The list below must
//! stay in sync with the wording the stores actually produce.

use crate::Error;
use crate::storage::{StoreError, StoreErrorKind};

/// Store write-error fragments that indicate a roles-field shape conflict.
pub const MIXED_MODE_STORE_MESSAGES: [&str; 9] = [
    "Cannot apply $addToSet modifier to non-array",
    "Cannot apply $addToSet to a non-array field",
    "Cannot apply $addToSet to non-array field",
    "Can only apply $pullAll to an array",
    "Cannot apply $pull/$pullAll modifier to non-array",
    "Cannot apply $pull to a non-array value",
    "can't append to array using string field name",
    "to traverse the element",
    "Cannot create field",
];

/// Returns `true` if `err` is a write failure caused by mixing role shapes.
#[must_use]
pub fn is_mixed_mode_failure(err: &StoreError) -> bool {
    err.kind == StoreErrorKind::Write
        && MIXED_MODE_STORE_MESSAGES
            .iter()
            .any(|fragment| err.message.contains(fragment))
}

/// Converts a store failure into a crate error.
pub fn translate(err: StoreError) -> Error {
    if is_mixed_mode_failure(&err) {
        Error::MixedRoleMode
    } else {
        Error::Store(err)
    }
}
