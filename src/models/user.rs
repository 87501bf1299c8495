//! User records and the role arguments accepted by the service.
//!
//! Users are owned by the host application; this crate only reads and
//! updates their `roles` field. A [`RolesField`] is either a flat list of
//! role names (legacy, ungrouped) or a mapping from group key to role names.
//! A single user never mixes the two shapes.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::group::GroupKey;

/// Ordered, duplicate-free set of role names.
pub type RoleSet = IndexSet<String>;

/// The roles attribute of a user record.
///
/// Serializes to the document shapes used by the store: a JSON array for
/// [`RolesField::Ungrouped`] and a JSON object for [`RolesField::Grouped`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RolesField {
    /// Role names without any group scoping.
    Ungrouped(RoleSet),
    /// Role names keyed by canonical group key.
    Grouped(IndexMap<String, RoleSet>),
}

impl RolesField {
    /// Creates an empty grouped field.
    #[must_use]
    pub fn grouped() -> Self {
        Self::Grouped(IndexMap::new())
    }

    /// Builds an ungrouped field from role names.
    #[must_use]
    pub fn ungrouped<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Ungrouped(roles.into_iter().map(Into::into).collect())
    }

    /// Returns a copy of this field with `roles` granted in `group`.
    ///
    /// An ungrouped field is returned unchanged.
    #[must_use]
    pub fn with_group<I, S>(mut self, group: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Self::Grouped(map) = &mut self {
            map.entry(group.to_string())
                .or_default()
                .extend(roles.into_iter().map(Into::into));
        }
        self
    }

    /// Returns `true` for the grouped shape.
    #[must_use]
    pub const fn is_grouped(&self) -> bool {
        matches!(self, Self::Grouped(_))
    }

    /// Returns the roles held in `group`, or `None` when the group is absent
    /// or the field is ungrouped.
    #[must_use]
    pub fn roles_in(&self, group: &GroupKey) -> Option<&RoleSet> {
        match self {
            Self::Grouped(map) => map.get(group.as_str()),
            Self::Ungrouped(_) => None,
        }
    }

    /// Returns `true` if `group` holds any of `roles`.
    #[must_use]
    pub fn has_any_role(&self, group: &GroupKey, roles: &[String]) -> bool {
        self.roles_in(group)
            .is_some_and(|held| roles.iter().any(|role| held.contains(role)))
    }

    /// Returns every group key in mapping order. Empty for ungrouped fields.
    #[must_use]
    pub fn groups(&self) -> Vec<String> {
        match self {
            Self::Grouped(map) => map.keys().cloned().collect(),
            Self::Ungrouped(_) => Vec::new(),
        }
    }

    /// Returns the group keys whose role set contains `role`, in mapping order.
    #[must_use]
    pub fn groups_with_role(&self, role: &str) -> Vec<String> {
        match self {
            Self::Grouped(map) => map
                .iter()
                .filter(|(_, roles)| roles.contains(role))
                .map(|(group, _)| group.clone())
                .collect(),
            Self::Ungrouped(_) => Vec::new(),
        }
    }
}

/// A user document as seen through the store.
///
/// Fields other than `id` and `roles` belong to the host application and are
/// carried opaquely in `profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique user identifier.
    pub id: String,
    /// Role assignments, absent until the first grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<RolesField>,
    /// Remaining host-application fields.
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl UserRecord {
    /// Creates a record with no roles and an empty profile.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: None,
            profile: Map::new(),
        }
    }

    /// Sets the roles field.
    #[must_use]
    pub fn with_roles(mut self, roles: RolesField) -> Self {
        self.roles = Some(roles);
        self
    }

    /// Adds a profile field.
    #[must_use]
    pub fn with_profile_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.profile.insert(key.into(), value.into());
        self
    }
}

/// Reference to a single user: a bare id or a full record.
#[derive(Debug, Clone, PartialEq)]
pub enum UserRef {
    /// A bare user id.
    Id(String),
    /// A user record, possibly carrying an already loaded roles field.
    Record(UserRecord),
}

impl UserRef {
    /// Returns the user id, or `None` when it is the empty string.
    ///
    /// Any other string, whitespace included, is used as given.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        let id = match self {
            Self::Id(id) => id.as_str(),
            Self::Record(record) => record.id.as_str(),
        };
        if id.is_empty() { None } else { Some(id) }
    }
}

impl From<&str> for UserRef {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for UserRef {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

impl From<&String> for UserRef {
    fn from(id: &String) -> Self {
        Self::Id(id.clone())
    }
}

impl From<UserRecord> for UserRef {
    fn from(record: UserRecord) -> Self {
        Self::Record(record)
    }
}

impl From<&UserRecord> for UserRef {
    fn from(record: &UserRecord) -> Self {
        Self::Record(record.clone())
    }
}

/// One or more users targeted by a mutation.
///
/// A single user is addressed by id equality; a list is addressed by id
/// membership, even when it has one element.
#[derive(Debug, Clone, PartialEq)]
pub enum UserSelection {
    /// A single user.
    One(UserRef),
    /// An ordered list of users.
    Many(Vec<UserRef>),
}

impl UserSelection {
    /// Returns `true` when no user was supplied at all: a single empty id.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::One(user) if user.id().is_none())
    }

    /// Normalizes the selection to distinct, non-empty ids in input order.
    ///
    /// References without a usable id are dropped.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let refs: &[UserRef] = match self {
            Self::One(user) => std::slice::from_ref(user),
            Self::Many(users) => users,
        };

        let mut seen = IndexSet::new();
        for id in refs.iter().filter_map(UserRef::id) {
            seen.insert(id.to_string());
        }
        seen.into_iter().collect()
    }
}

impl<T: Into<UserRef>> From<Vec<T>> for UserSelection {
    fn from(users: Vec<T>) -> Self {
        Self::Many(users.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<UserRef> + Clone> From<&[T]> for UserSelection {
    fn from(users: &[T]) -> Self {
        Self::Many(users.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<UserRef>, const N: usize> From<[T; N]> for UserSelection {
    fn from(users: [T; N]) -> Self {
        Self::Many(users.into_iter().map(Into::into).collect())
    }
}

impl From<UserRef> for UserSelection {
    fn from(user: UserRef) -> Self {
        Self::One(user)
    }
}

impl From<&str> for UserSelection {
    fn from(id: &str) -> Self {
        Self::One(id.into())
    }
}

impl From<String> for UserSelection {
    fn from(id: String) -> Self {
        Self::One(id.into())
    }
}

impl From<&String> for UserSelection {
    fn from(id: &String) -> Self {
        Self::One(id.into())
    }
}

impl From<UserRecord> for UserSelection {
    fn from(record: UserRecord) -> Self {
        Self::One(record.into())
    }
}

impl From<&UserRecord> for UserSelection {
    fn from(record: &UserRecord) -> Self {
        Self::One(record.into())
    }
}

/// One or more role names supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleSelection {
    /// A single role name.
    One(String),
    /// A list of role names.
    Many(Vec<String>),
}

impl RoleSelection {
    /// Returns `true` when no role was supplied at all: a single empty name.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::One(role) if role.is_empty())
    }

    /// Returns the names exactly as supplied.
    #[must_use]
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::One(role) => vec![role.clone()],
            Self::Many(roles) => roles.clone(),
        }
    }

    /// Returns trimmed, non-blank, distinct names in input order.
    #[must_use]
    pub fn normalized(&self) -> Vec<String> {
        let mut seen = IndexSet::new();
        for role in self.as_list() {
            let role = role.trim();
            if !role.is_empty() {
                seen.insert(role.to_string());
            }
        }
        seen.into_iter().collect()
    }
}

impl From<&str> for RoleSelection {
    fn from(role: &str) -> Self {
        Self::One(role.to_string())
    }
}

impl From<String> for RoleSelection {
    fn from(role: String) -> Self {
        Self::One(role)
    }
}

impl From<&String> for RoleSelection {
    fn from(role: &String) -> Self {
        Self::One(role.clone())
    }
}

impl<T: Into<String>> From<Vec<T>> for RoleSelection {
    fn from(roles: Vec<T>) -> Self {
        Self::Many(roles.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<String> + Clone> From<&[T]> for RoleSelection {
    fn from(roles: &[T]) -> Self {
        Self::Many(roles.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<String>, const N: usize> From<[T; N]> for RoleSelection {
    fn from(roles: [T; N]) -> Self {
        Self::Many(roles.into_iter().map(Into::into).collect())
    }
}
