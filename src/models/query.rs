//! Typed filters, updates, and read options for the user store.
//!
//! These types are the whole vocabulary the role service speaks to a
//! [`UserStore`](crate::storage::UserStore): which users to match, how to
//! change one group's role set, and how to shape the returned documents.

use serde::{Deserialize, Serialize};

use super::group::GroupKey;

/// Match on the user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdMatch {
    /// Exactly this id.
    Eq(String),
    /// Any of these ids.
    In(Vec<String>),
}

impl IdMatch {
    /// Returns `true` if `id` satisfies this match.
    #[must_use]
    pub fn matches(&self, id: &str) -> bool {
        match self {
            Self::Eq(expected) => expected == id,
            Self::In(ids) => ids.iter().any(|candidate| candidate == id),
        }
    }
}

/// Match on the role names held in a group.
///
/// A single role uses equality; a list uses membership. Both are
/// semantically "the group's set contains any of these".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleMatch {
    /// The group's set contains this role.
    Eq(String),
    /// The group's set contains any of these roles.
    In(Vec<String>),
}

impl RoleMatch {
    /// Returns the role names this match accepts.
    #[must_use]
    pub fn names(&self) -> &[String] {
        match self {
            Self::Eq(role) => std::slice::from_ref(role),
            Self::In(roles) => roles,
        }
    }
}

/// Role predicate scoped to a single group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRoleMatch {
    /// Group whose role set is inspected.
    pub group: GroupKey,
    /// Roles to look for.
    pub roles: RoleMatch,
}

/// Conjunction of optional id and group-role predicates.
///
/// An empty filter matches every user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    /// Id predicate.
    pub id: Option<IdMatch>,
    /// Group-role predicate.
    pub roles: Option<GroupRoleMatch>,
}

impl UserFilter {
    /// Matches a single user id.
    #[must_use]
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(IdMatch::Eq(id.into())),
            roles: None,
        }
    }

    /// Matches any of the given ids.
    #[must_use]
    pub fn by_ids(ids: Vec<String>) -> Self {
        Self {
            id: Some(IdMatch::In(ids)),
            roles: None,
        }
    }

    /// Adds a group-role predicate.
    #[must_use]
    pub fn with_group_roles(mut self, group: GroupKey, roles: RoleMatch) -> Self {
        self.roles = Some(GroupRoleMatch { group, roles });
        self
    }
}

/// A single change to one group's role set, applied to every matched user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolesUpdate {
    /// Union the roles into the group's set.
    AddToSet {
        /// Target group.
        group: GroupKey,
        /// Roles to add.
        roles: Vec<String>,
    },
    /// Replace the group's set with exactly these roles.
    Set {
        /// Target group.
        group: GroupKey,
        /// New role set.
        roles: Vec<String>,
    },
    /// Remove every listed role from the group's set.
    PullAll {
        /// Target group.
        group: GroupKey,
        /// Roles to remove.
        roles: Vec<String>,
    },
}

impl RolesUpdate {
    /// Returns the target group.
    #[must_use]
    pub const fn group(&self) -> &GroupKey {
        match self {
            Self::AddToSet { group, .. } | Self::Set { group, .. } | Self::PullAll { group, .. } => {
                group
            },
        }
    }

    /// Returns the roles carried by the update.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        match self {
            Self::AddToSet { roles, .. } | Self::Set { roles, .. } | Self::PullAll { roles, .. } => {
                roles
            },
        }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AddToSet { .. } => "add",
            Self::Set { .. } => "set",
            Self::PullAll { .. } => "remove",
        }
    }
}

/// Options for an update call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Apply to every matching user rather than the first one.
    pub multi: bool,
}

impl UpdateOptions {
    /// Update every matching user.
    #[must_use]
    pub const fn multi() -> Self {
        Self { multi: true }
    }
}

/// Read routing hint passed through to the store.
///
/// Reads served from a replica may lag behind a preceding write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPreference {
    /// Always read from the primary.
    #[default]
    Primary,
    /// Prefer the primary, fall back to a secondary.
    PrimaryPreferred,
    /// Always read from a secondary.
    Secondary,
    /// Prefer a secondary, fall back to the primary.
    SecondaryPreferred,
    /// Read from the lowest-latency member.
    Nearest,
}

impl ReadPreference {
    /// Returns the preference as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PrimaryPreferred => "primary_preferred",
            Self::Secondary => "secondary",
            Self::SecondaryPreferred => "secondary_preferred",
            Self::Nearest => "nearest",
        }
    }

    /// Parses a preference, accepting snake, kebab, and camel case.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "primary" => Some(Self::Primary),
            "primary_preferred" | "primarypreferred" => Some(Self::PrimaryPreferred),
            "secondary" => Some(Self::Secondary),
            "secondary_preferred" | "secondarypreferred" => Some(Self::SecondaryPreferred),
            "nearest" => Some(Self::Nearest),
            _ => None,
        }
    }
}

/// Direction of one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest values first.
    Ascending,
    /// Largest values first.
    Descending,
}

/// One sort key: a document field and its direction.
///
/// `"id"` sorts by user id; any other name sorts by that profile field.
/// Field values order nulls and missing fields first, then numbers (booleans
/// count as 0 and 1), then text. Nested values compare by their JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Field name.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

impl SortKey {
    /// Name that addresses the user id.
    pub const ID_FIELD: &'static str = "id";

    /// Creates a sort key.
    #[must_use]
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Sorts by `field`, smallest first.
    #[must_use]
    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    /// Sorts by `field`, largest first.
    #[must_use]
    pub fn descending(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Descending)
    }

    /// Returns `true` when the key addresses the user id (`id` or `_id`).
    #[must_use]
    pub fn is_id(&self) -> bool {
        self.field == Self::ID_FIELD || self.field == "_id"
    }
}

/// Which parts of a user document a read returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// The whole document.
    #[default]
    Full,
    /// Only the id.
    IdOnly,
    /// The id and the whole roles field.
    Roles,
    /// The id and a single group's entry of the roles field.
    GroupRoles(GroupKey),
    /// The id and only the named fields (`"roles"` or profile keys).
    Include(Vec<String>),
    /// Everything except the named fields (`"roles"` or profile keys).
    Exclude(Vec<String>),
}

/// Fully resolved options for a read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Document shape.
    pub projection: Projection,
    /// Sort keys, first key first; store order when empty.
    pub sort: Vec<SortKey>,
    /// Number of matches to skip.
    pub skip: usize,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Routing hint.
    pub read_preference: ReadPreference,
}

impl FindOptions {
    /// Sets the projection.
    #[must_use]
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Sets the read preference.
    #[must_use]
    pub fn with_read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = read_preference;
        self
    }

    /// Overlays caller-supplied options; set fields win.
    #[must_use]
    pub fn merged(mut self, overrides: QueryOptions) -> Self {
        if let Some(projection) = overrides.projection {
            self.projection = projection;
        }
        if let Some(sort) = overrides.sort {
            self.sort = sort;
        }
        if let Some(skip) = overrides.skip {
            self.skip = skip;
        }
        if let Some(limit) = overrides.limit {
            self.limit = Some(limit);
        }
        if let Some(read_preference) = overrides.read_preference {
            self.read_preference = read_preference;
        }
        self
    }
}

/// Caller-supplied read options, merged on top of the service defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Document shape.
    pub projection: Option<Projection>,
    /// Sort keys, first key first.
    pub sort: Option<Vec<SortKey>>,
    /// Number of matches to skip.
    pub skip: Option<usize>,
    /// Maximum number of documents.
    pub limit: Option<usize>,
    /// Routing hint.
    pub read_preference: Option<ReadPreference>,
}

impl QueryOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the projection.
    #[must_use]
    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Appends a sort key; earlier keys take precedence.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort
            .get_or_insert_with(Vec::new)
            .push(SortKey::new(field, direction));
        self
    }

    /// Sets the number of matches to skip.
    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Sets the maximum number of documents.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the read preference.
    #[must_use]
    pub fn read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = Some(read_preference);
        self
    }
}
