//! Document semantics shared by the user store backends.
//!
//! Backends differ in where documents live; how a filter matches, how an
//! update changes a roles field, and how a projection shapes a result are
//! defined once here. Shape conflicts are reported with the same wording a
//! document database uses, so the role service can recognize them.

use std::borrow::Cow;
use std::cmp::Ordering;

use indexmap::IndexMap;
use serde_json::Value;

use crate::models::{
    GroupKey, Projection, RoleSet, RolesField, RolesUpdate, SortDirection, SortKey, UserFilter,
    UserRecord,
};

use super::traits::{StoreError, StoreResult};

/// Returns `true` if `user` satisfies every predicate of `filter`.
#[must_use]
pub fn matches(filter: &UserFilter, user: &UserRecord) -> bool {
    if let Some(id) = &filter.id
        && !id.matches(&user.id)
    {
        return false;
    }

    if let Some(predicate) = &filter.roles {
        let held = user
            .roles
            .as_ref()
            .and_then(|roles| roles.roles_in(&predicate.group));
        let Some(held) = held else {
            return false;
        };
        return predicate
            .roles
            .names()
            .iter()
            .any(|role| held.contains(role));
    }

    true
}

/// Applies `update` to a user's current roles field.
///
/// Returns the field to store, or `None` when the user had no roles field
/// and the update leaves it absent.
///
/// # Errors
///
/// Returns a write error when the update addresses a group inside an
/// ungrouped (list-shaped) roles field.
pub fn apply_update(
    current: Option<RolesField>,
    update: &RolesUpdate,
) -> StoreResult<Option<RolesField>> {
    match update {
        RolesUpdate::AddToSet { group, roles } => {
            let mut map = grouped_or_conflict(current, group)?;
            map.entry(group.as_str().to_string())
                .or_default()
                .extend(roles.iter().cloned());
            Ok(Some(RolesField::Grouped(map)))
        },
        RolesUpdate::Set { group, roles } => {
            let mut map = grouped_or_conflict(current, group)?;
            let replacement: RoleSet = roles.iter().cloned().collect();
            map.insert(group.as_str().to_string(), replacement);
            Ok(Some(RolesField::Grouped(map)))
        },
        RolesUpdate::PullAll { group, roles } => match current {
            None => Ok(None),
            Some(RolesField::Ungrouped(held)) => Err(traverse_conflict(group, &held)),
            Some(RolesField::Grouped(mut map)) => {
                if let Some(held) = map.get_mut(group.as_str()) {
                    held.retain(|role| !roles.contains(role));
                }
                Ok(Some(RolesField::Grouped(map)))
            },
        },
    }
}

fn grouped_or_conflict(
    current: Option<RolesField>,
    group: &GroupKey,
) -> StoreResult<IndexMap<String, RoleSet>> {
    match current {
        None => Ok(IndexMap::new()),
        Some(RolesField::Grouped(map)) => Ok(map),
        Some(RolesField::Ungrouped(held)) => Err(StoreError::write(format!(
            "Cannot create field '{group}' in element {{roles: {}}}",
            render_list(&held)
        ))),
    }
}

fn traverse_conflict(group: &GroupKey, held: &RoleSet) -> StoreError {
    StoreError::write(format!(
        "cannot use the part ({group} of roles.{group}) to traverse the element ({{roles: {}}})",
        render_list(held)
    ))
}

fn render_list(roles: &RoleSet) -> String {
    let quoted: Vec<String> = roles.iter().map(|role| format!("\"{role}\"")).collect();
    format!("[ {} ]", quoted.join(", "))
}

/// Shapes a document according to `projection`.
#[must_use]
pub fn project(mut user: UserRecord, projection: &Projection) -> UserRecord {
    match projection {
        Projection::Full => user,
        Projection::IdOnly => UserRecord::new(user.id),
        Projection::Roles => UserRecord {
            id: user.id,
            roles: user.roles,
            profile: serde_json::Map::new(),
        },
        Projection::GroupRoles(group) => {
            let roles = match user.roles {
                Some(RolesField::Grouped(mut map)) => {
                    let mut only = IndexMap::new();
                    if let Some(held) = map.shift_remove(group.as_str()) {
                        only.insert(group.as_str().to_string(), held);
                    }
                    Some(RolesField::Grouped(only))
                },
                // A group path into a list selects nothing.
                Some(RolesField::Ungrouped(_)) => Some(RolesField::Ungrouped(RoleSet::new())),
                None => None,
            };
            UserRecord {
                id: user.id,
                roles,
                profile: serde_json::Map::new(),
            }
        },
        Projection::Include(fields) => {
            let wanted = |name: &str| fields.iter().any(|field| field == name);
            let roles = if wanted("roles") { user.roles } else { None };
            let profile = user
                .profile
                .into_iter()
                .filter(|(key, _)| wanted(key))
                .collect();
            UserRecord {
                id: user.id,
                roles,
                profile,
            }
        },
        Projection::Exclude(fields) => {
            for field in fields {
                if field == "roles" {
                    user.roles = None;
                } else {
                    user.profile.remove(field);
                }
            }
            user
        },
    }
}

/// Orders two documents by `sort`, first key first.
///
/// Profile values order as `SQLite` orders them, so both backends agree:
/// missing and null first, then numbers (booleans as 0 and 1), then text.
/// Objects and arrays compare by their JSON text.
#[must_use]
pub fn compare(a: &UserRecord, b: &UserRecord, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let ordering = if key.is_id() {
            a.id.cmp(&b.id)
        } else {
            compare_values(a.profile.get(&key.field), b.profile.get(&key.field))
        };
        let ordering = match key.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

enum SortValue<'a> {
    Null,
    Number(f64),
    Text(Cow<'a, str>),
}

impl<'a> SortValue<'a> {
    fn of(value: Option<&'a Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Null,
            Some(Value::Bool(flag)) => Self::Number(if *flag { 1.0 } else { 0.0 }),
            Some(Value::Number(number)) => Self::Number(number.as_f64().unwrap_or_default()),
            Some(Value::String(text)) => Self::Text(Cow::Borrowed(text)),
            Some(nested) => Self::Text(Cow::Owned(nested.to_string())),
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (SortValue::of(a), SortValue::of(b)) {
        (SortValue::Null, SortValue::Null) => Ordering::Equal,
        (SortValue::Null, _) | (SortValue::Number(_), SortValue::Text(_)) => Ordering::Less,
        (_, SortValue::Null) | (SortValue::Text(_), SortValue::Number(_)) => Ordering::Greater,
        (SortValue::Number(x), SortValue::Number(y)) => x.total_cmp(&y),
        (SortValue::Text(x), SortValue::Text(y)) => x.cmp(&y),
    }
}

/// Filters, sorts, and pages `users` as one page of a find would.
///
/// Sorting is stable, so ties keep store order. Projection is left to the
/// cursor.
#[must_use]
pub fn select<'a>(
    users: impl IntoIterator<Item = &'a UserRecord>,
    filter: &UserFilter,
    sort: &[SortKey],
    skip: usize,
    limit: Option<usize>,
) -> Vec<UserRecord> {
    let mut matched: Vec<&UserRecord> = users.into_iter().filter(|u| matches(filter, u)).collect();
    if !sort.is_empty() {
        matched.sort_by(|a, b| compare(a, b, sort));
    }

    let paged = matched.into_iter().skip(skip).cloned();
    match limit {
        Some(limit) => paged.take(limit).collect(),
        None => paged.collect(),
    }
}
