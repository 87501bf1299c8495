//! Role assignment service.
//!
//! Grants, replaces, revokes, and looks up role names scoped to a group.
//! Every operation canonicalizes its group, normalizes its user and role
//! arguments, then issues exactly one call against the injected
//! [`UserStore`].
//!
//! # Operations
//!
//! | Operation | Store call | Group required |
//! |-----------|------------|----------------|
//! | [`add_roles_to_users`](RoleAssignmentService::add_roles_to_users) | update (add to set) | yes |
//! | [`set_roles_for_users`](RoleAssignmentService::set_roles_for_users) | update (set) | yes |
//! | [`remove_roles_from_users`](RoleAssignmentService::remove_roles_from_users) | update (pull all) | yes |
//! | [`user_has_any_role`](RoleAssignmentService::user_has_any_role) | find one, unless roles are loaded | yes |
//! | [`roles_for_user`](RoleAssignmentService::roles_for_user) | find one, unless given a record | yes |
//! | [`groups_for_user`](RoleAssignmentService::groups_for_user) | find one, unless given a record | no |
//! | [`users_in_role`](RoleAssignmentService::users_in_role) | find | yes |
//!
//! # Example
//!
//! ```rust
//! use scoped_roles::models::UserRecord;
//! use scoped_roles::services::RoleAssignmentService;
//! use scoped_roles::storage::UserStoreFactory;
//!
//! let store = UserStoreFactory::create_in_memory();
//! store.insert(UserRecord::new("eve")).unwrap();
//!
//! let roles = RoleAssignmentService::initialize(store).unwrap();
//! roles.add_roles_to_users("eve", ["admin", "user"], "example.com").unwrap();
//!
//! assert!(roles.user_has_any_role("eve", "admin", "example.com").unwrap());
//! assert_eq!(roles.groups_for_user("eve", None).unwrap(), vec!["example_com"]);
//! ```

use std::sync::Arc;

use tracing::instrument;

use crate::config::RolesConfig;
use crate::models::{
    FindOptions, GroupKey, Projection, QueryOptions, ReadPreference, RoleMatch, RoleSelection,
    RolesField, RolesUpdate, UpdateOptions, UserFilter, UserRef, UserSelection,
};
use crate::storage::{UserCursor, UserStore, UserStoreFactory};
use crate::{Error, Result};

use super::mixed_mode;

/// Read preference used for lookups unless configured otherwise.
pub const DEFAULT_READ_PREFERENCE: ReadPreference = ReadPreference::SecondaryPreferred;

/// How a mutation combines new roles with the ones a group already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateKind {
    /// Keep existing roles and add the new ones.
    Union,
    /// Replace the group's roles with exactly the new ones.
    Replace,
}

impl UpdateKind {
    fn build(self, group: GroupKey, roles: Vec<String>) -> RolesUpdate {
        match self {
            Self::Union => RolesUpdate::AddToSet { group, roles },
            Self::Replace => RolesUpdate::Set { group, roles },
        }
    }
}

/// Service for group-scoped role assignments.
///
/// Holds no mutable state of its own; concurrent callers only share the
/// store, whose updates are atomic per call.
pub struct RoleAssignmentService {
    store: Arc<dyn UserStore>,
    read_preference: ReadPreference,
}

impl RoleAssignmentService {
    /// Creates a service over an already initialized store.
    ///
    /// No store call is made.
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self {
            store,
            read_preference: DEFAULT_READ_PREFERENCE,
        }
    }

    /// Initializes `store` and creates a service over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be prepared.
    pub fn initialize(store: Arc<dyn UserStore>) -> Result<Self> {
        store.initialize()?;
        tracing::debug!("User store initialized");
        Ok(Self::new(store))
    }

    /// Builds the configured store, initializes it, and applies the
    /// configured read preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be created or initialized.
    pub fn from_config(config: &RolesConfig) -> Result<Self> {
        let store = UserStoreFactory::create(&config.store)?;
        Ok(Self::initialize(store)?.with_read_preference(config.read_preference))
    }

    /// Sets the read preference used for lookups.
    #[must_use]
    pub fn with_read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = read_preference;
        self
    }

    /// Returns the read preference used for lookups.
    #[must_use]
    pub const fn read_preference(&self) -> ReadPreference {
        self.read_preference
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Adds roles to users within a group.
    ///
    /// Existing roles in the group are kept; duplicates are not created.
    /// Role names are trimmed and blank names dropped, so an all-blank list
    /// is a no-op union.
    ///
    /// # Returns
    ///
    /// The number of users matched.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `group` is blank or starts with `$` ([`Error::InvalidGroup`])
    /// - no role was supplied ([`Error::MissingRoles`])
    /// - a matched user holds ungrouped roles ([`Error::MixedRoleMode`])
    /// - the store fails
    #[instrument(skip(self, users, roles), fields(group = %group))]
    pub fn add_roles_to_users(
        &self,
        users: impl Into<UserSelection>,
        roles: impl Into<RoleSelection>,
        group: &str,
    ) -> Result<usize> {
        self.update_user_roles(&users.into(), &roles.into(), group, UpdateKind::Union)
    }

    /// Replaces users' roles within a group.
    ///
    /// Roles in other groups are untouched. An empty list clears the group.
    ///
    /// # Returns
    ///
    /// The number of users matched.
    ///
    /// # Errors
    ///
    /// Same as [`add_roles_to_users`](Self::add_roles_to_users).
    #[instrument(skip(self, users, roles), fields(group = %group))]
    pub fn set_roles_for_users(
        &self,
        users: impl Into<UserSelection>,
        roles: impl Into<RoleSelection>,
        group: &str,
    ) -> Result<usize> {
        self.update_user_roles(&users.into(), &roles.into(), group, UpdateKind::Replace)
    }

    /// Removes roles from users within a group.
    ///
    /// Removing a role a user does not hold is a no-op. Role names are used
    /// exactly as supplied.
    ///
    /// # Returns
    ///
    /// The number of users matched.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `group` is blank or starts with `$` ([`Error::InvalidGroup`])
    /// - no user was supplied ([`Error::MissingUsers`])
    /// - no role was supplied ([`Error::MissingRoles`])
    /// - a matched user holds ungrouped roles ([`Error::MixedRoleMode`])
    /// - the store fails
    #[instrument(skip(self, users, roles), fields(group = %group))]
    pub fn remove_roles_from_users(
        &self,
        users: impl Into<UserSelection>,
        roles: impl Into<RoleSelection>,
        group: &str,
    ) -> Result<usize> {
        let group = GroupKey::canonicalize(group)?;
        let users = users.into();
        let roles = roles.into();

        if users.is_missing() {
            return Err(Error::MissingUsers);
        }
        if roles.is_missing() {
            return Err(Error::MissingRoles);
        }

        let update = RolesUpdate::PullAll {
            group,
            roles: roles.as_list(),
        };
        self.apply(&users, &update)
    }

    /// Returns `true` if the user holds any of `roles` in `group`.
    ///
    /// A record with a loaded roles field is answered without a store call.
    /// A blank user is never in any role.
    ///
    /// # Errors
    ///
    /// Returns an error if `group` is invalid or the store lookup fails.
    #[instrument(skip(self, user, roles), fields(group = %group))]
    pub fn user_has_any_role(
        &self,
        user: impl Into<UserRef>,
        roles: impl Into<RoleSelection>,
        group: &str,
    ) -> Result<bool> {
        let group = GroupKey::canonicalize(group)?;
        let roles = roles.into();

        let user = user.into();
        if let UserRef::Record(record) = &user
            && let Some(field) = &record.roles
        {
            return Ok(field.has_any_role(&group, &roles.as_list()));
        }

        let Some(id) = user.id() else {
            return Ok(false);
        };

        metrics::counter!("roles_query_total", "operation" => "user_has_any_role").increment(1);
        let filter = UserFilter::by_id(id).with_group_roles(group, role_match(&roles));
        let options = self.find_options().with_projection(Projection::IdOnly);
        let found = self.store.find_one(&filter, &options)?;

        tracing::debug!(user_id = %id, found = found.is_some(), "Checked role membership");
        Ok(found.is_some())
    }

    /// Returns the roles a user holds in `group`.
    ///
    /// An id is looked up in the store, projecting only that group. A record
    /// is answered from its own roles field. Unknown users, users without
    /// roles in the group, and ungrouped users all yield an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if `group` is invalid or the store lookup fails.
    #[instrument(skip(self, user), fields(group = %group))]
    pub fn roles_for_user(&self, user: impl Into<UserRef>, group: &str) -> Result<Vec<String>> {
        let group = GroupKey::canonicalize(group)?;

        let roles = match user.into() {
            UserRef::Record(record) => record.roles,
            UserRef::Id(id) => {
                if id.is_empty() {
                    return Ok(Vec::new());
                }
                metrics::counter!("roles_query_total", "operation" => "roles_for_user")
                    .increment(1);
                let options = self
                    .find_options()
                    .with_projection(Projection::GroupRoles(group.clone()));
                self.store
                    .find_one(&UserFilter::by_id(id), &options)?
                    .and_then(|found| found.roles)
            },
        };

        Ok(roles
            .as_ref()
            .and_then(|field| field.roles_in(&group))
            .map(|held| held.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Returns the groups a user holds roles in.
    ///
    /// No group argument is involved. With `role`, only groups whose set
    /// contains that role are returned, in mapping order. A `role` that is
    /// empty or starts with `$` matches nothing. Ungrouped users have no
    /// groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup fails.
    #[instrument(skip(self, user))]
    pub fn groups_for_user(
        &self,
        user: impl Into<UserRef>,
        role: Option<&str>,
    ) -> Result<Vec<String>> {
        if let Some(role) = role
            && (role.is_empty() || role.starts_with('$'))
        {
            return Ok(Vec::new());
        }

        let roles = match user.into() {
            UserRef::Record(record) => record.roles,
            UserRef::Id(id) => {
                if id.is_empty() {
                    return Ok(Vec::new());
                }
                metrics::counter!("roles_query_total", "operation" => "groups_for_user")
                    .increment(1);
                let options = self.find_options().with_projection(Projection::Roles);
                self.store
                    .find_one(&UserFilter::by_id(id), &options)?
                    .and_then(|found| found.roles)
            },
        };

        Ok(match (roles, role) {
            (Some(field @ RolesField::Grouped(_)), Some(role)) => field.groups_with_role(role),
            (Some(field @ RolesField::Grouped(_)), None) => field.groups(),
            _ => Vec::new(),
        })
    }

    /// Returns a cursor over users holding any of `roles` in `group`.
    ///
    /// Caller options (sort keys, projection, skip, limit, read preference)
    /// are merged over the service defaults. The query runs as the cursor is
    /// iterated, one page at a time. The roles field
    /// is not indexed, so this scans every user; narrow it by id where
    /// possible.
    ///
    /// # Errors
    ///
    /// Returns an error if `group` is invalid or the store query fails.
    #[instrument(skip(self, roles, options), fields(group = %group))]
    pub fn users_in_role(
        &self,
        roles: impl Into<RoleSelection>,
        group: &str,
        options: Option<QueryOptions>,
    ) -> Result<UserCursor> {
        let group = GroupKey::canonicalize(group)?;
        let roles = roles.into();

        metrics::counter!("roles_query_total", "operation" => "users_in_role").increment(1);
        let filter = UserFilter::default().with_group_roles(group, role_match(&roles));
        let options = self.find_options().merged(options.unwrap_or_default());
        let cursor = self.store.find(&filter, &options)?;

        tracing::debug!(
            skip = options.skip,
            limit = ?options.limit,
            sort_keys = options.sort.len(),
            "Opened users-in-role cursor"
        );
        Ok(cursor)
    }

    /// Shared path for union and replace updates.
    fn update_user_roles(
        &self,
        users: &UserSelection,
        roles: &RoleSelection,
        group: &str,
        kind: UpdateKind,
    ) -> Result<usize> {
        let group = GroupKey::canonicalize(group)?;

        if roles.is_missing() {
            return Err(Error::MissingRoles);
        }

        let update = kind.build(group, roles.normalized());
        self.apply(users, &update)
    }

    /// Issues `update` against the selected users, translating shape
    /// conflicts.
    fn apply(&self, users: &UserSelection, update: &RolesUpdate) -> Result<usize> {
        let filter = target_filter(users);

        let matched = self
            .store
            .update(&filter, update, UpdateOptions::multi())
            .map_err(|err| {
                if mixed_mode::is_mixed_mode_failure(&err) {
                    tracing::warn!(
                        group = %update.group(),
                        update = update.kind(),
                        store_error = %err,
                        "Rejected update mixing grouped and ungrouped roles"
                    );
                    metrics::counter!("roles_mixed_mode_total", "kind" => update.kind())
                        .increment(1);
                }
                mixed_mode::translate(err)
            })?;

        tracing::info!(
            group = %update.group(),
            update = update.kind(),
            roles = ?update.roles(),
            matched,
            "Updated user roles"
        );
        metrics::counter!("roles_update_total", "kind" => update.kind()).increment(1);

        Ok(matched)
    }

    fn find_options(&self) -> FindOptions {
        FindOptions::default().with_read_preference(self.read_preference)
    }
}

/// A single user is addressed by id equality, a list by id membership.
fn target_filter(users: &UserSelection) -> UserFilter {
    match users {
        UserSelection::One(user) => user
            .id()
            .map_or_else(|| UserFilter::by_ids(Vec::new()), UserFilter::by_id),
        UserSelection::Many(_) => UserFilter::by_ids(users.ids()),
    }
}

/// A single role is matched by equality, a list by membership.
fn role_match(roles: &RoleSelection) -> RoleMatch {
    match roles {
        RoleSelection::One(role) => RoleMatch::Eq(role.clone()),
        RoleSelection::Many(roles) => RoleMatch::In(roles.clone()),
    }
}
