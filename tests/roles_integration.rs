//! Integration tests for group-scoped role assignment.
//!
//! Every scenario runs against both the in-memory and the `SQLite` store.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::thread;

use scoped_roles::models::{
    FindOptions, Projection, QueryOptions, SortDirection, SortKey, UserFilter,
};
use scoped_roles::storage::{InMemoryUserStore, SqliteUserStore};
use scoped_roles::{
    Error, GroupKeyError, RoleAssignmentService, RolesConfig, RolesField, RolesPublication,
    UserRecord, UserStore,
};
use tempfile::TempDir;
use test_case::test_case;

#[derive(Debug, Clone, Copy)]
enum Backend {
    Memory,
    Sqlite,
}

/// Holds the store alive (and its temp dir, for `SQLite`) for a test.
struct Fixture {
    roles: RoleAssignmentService,
    store: Arc<dyn UserStore>,
    _dir: Option<TempDir>,
}

fn fixture(backend: Backend) -> Fixture {
    let (store, dir): (Arc<dyn UserStore>, Option<TempDir>) = match backend {
        Backend::Memory => (Arc::new(InMemoryUserStore::new()), None),
        Backend::Sqlite => {
            let dir = TempDir::new().expect("temp dir");
            let store = SqliteUserStore::open(dir.path().join("users.db")).expect("open sqlite");
            (Arc::new(store), Some(dir))
        },
    };

    let roles = RoleAssignmentService::initialize(Arc::clone(&store)).expect("initialize");
    for name in ["eve", "bob", "joe"] {
        store
            .insert(UserRecord::new(name).with_profile_field("username", name))
            .expect("seed user");
    }

    Fixture {
        roles,
        store,
        _dir: dir,
    }
}

fn sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_add_roles_then_query(backend: Backend) {
    let fx = fixture(backend);
    let roles = &fx.roles;

    roles
        .add_roles_to_users("eve", ["admin", "user"], "group1")
        .expect("add roles");

    assert_eq!(
        sorted(roles.roles_for_user("eve", "group1").expect("roles")),
        vec!["admin", "user"]
    );
    assert!(roles.user_has_any_role("eve", "admin", "group1").expect("check"));
    assert!(!roles.user_has_any_role("eve", "admin", "group2").expect("check"));
    assert!(roles.roles_for_user("bob", "group1").expect("roles").is_empty());
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_add_is_idempotent_and_trims(backend: Backend) {
    let fx = fixture(backend);
    let roles = &fx.roles;

    roles
        .add_roles_to_users("eve", vec![" admin", "admin", "", "user "], "group1")
        .expect("add roles");
    roles
        .add_roles_to_users("eve", vec!["user", "admin"], "group1")
        .expect("add again");

    assert_eq!(
        sorted(roles.roles_for_user("eve", "group1").expect("roles")),
        vec!["admin", "user"]
    );
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_set_roles_replaces_and_clears(backend: Backend) {
    let fx = fixture(backend);
    let roles = &fx.roles;

    roles
        .add_roles_to_users("eve", ["admin", "user"], "group1")
        .expect("add roles");
    roles
        .add_roles_to_users("eve", "editor", "group2")
        .expect("add roles");

    roles
        .set_roles_for_users("eve", ["guest"], "group1")
        .expect("set roles");
    assert_eq!(roles.roles_for_user("eve", "group1").expect("roles"), vec!["guest"]);

    roles
        .set_roles_for_users("eve", Vec::<String>::new(), "group1")
        .expect("clear roles");
    assert!(roles.roles_for_user("eve", "group1").expect("roles").is_empty());
    assert_eq!(roles.roles_for_user("eve", "group2").expect("roles"), vec!["editor"]);

    // The cleared group remains a key of the mapping.
    assert_eq!(
        roles.groups_for_user("eve", None).expect("groups"),
        vec!["group1", "group2"]
    );
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_remove_roles(backend: Backend) {
    let fx = fixture(backend);
    let roles = &fx.roles;

    roles
        .add_roles_to_users(["bob", "joe"], ["admin", "editor", "user"], "group1")
        .expect("add roles");

    roles
        .remove_roles_from_users("bob", "admin", "group1")
        .expect("remove single");
    roles
        .remove_roles_from_users(["bob", "joe"], ["editor", "missing"], "group1")
        .expect("remove list");

    assert_eq!(roles.roles_for_user("bob", "group1").expect("roles"), vec!["user"]);
    assert_eq!(
        roles.roles_for_user("joe", "group1").expect("roles"),
        vec!["admin", "user"]
    );

    // Users without any roles field are unaffected.
    roles
        .remove_roles_from_users("eve", "admin", "group1")
        .expect("remove from user without roles");
    assert!(roles.groups_for_user("eve", None).expect("groups").is_empty());
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_invalid_group_writes_nothing(backend: Backend) {
    let fx = fixture(backend);
    let (roles, store) = (&fx.roles, &fx.store);

    for group in ["$bad", "", "   "] {
        let err = roles
            .add_roles_to_users("eve", "admin", group)
            .expect_err("invalid group");
        assert!(matches!(err, Error::InvalidGroup(_)), "{group:?}: {err}");
        assert!(roles.set_roles_for_users("eve", "admin", group).is_err());
        assert!(roles.remove_roles_from_users("eve", "admin", group).is_err());
    }

    let err = roles
        .add_roles_to_users("eve", "admin", "$bad")
        .expect_err("invalid group");
    assert!(matches!(err, Error::InvalidGroup(GroupKeyError::ReservedPrefix)));

    let eve = store
        .find_one(
            &scoped_roles::models::UserFilter::by_id("eve"),
            &scoped_roles::models::FindOptions::default(),
        )
        .expect("find")
        .expect("eve exists");
    assert!(eve.roles.is_none());
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_dotted_groups_share_a_key(backend: Backend) {
    let fx = fixture(backend);
    let roles = &fx.roles;

    roles
        .add_roles_to_users("eve", "admin", "example.k12.va.us")
        .expect("add roles");

    assert!(
        roles
            .user_has_any_role("eve", "admin", "example_k12_va_us")
            .expect("check")
    );
    assert_eq!(
        roles.groups_for_user("eve", Some("admin")).expect("groups"),
        vec!["example_k12_va_us"]
    );
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_groups_for_user(backend: Backend) {
    let fx = fixture(backend);
    let roles = &fx.roles;

    roles.add_roles_to_users("eve", "admin", "group1").expect("add");
    roles.add_roles_to_users("eve", "editor", "group2").expect("add");

    assert_eq!(
        roles.groups_for_user("eve", Some("admin")).expect("groups"),
        vec!["group1"]
    );
    assert_eq!(
        sorted(roles.groups_for_user("eve", None).expect("groups")),
        vec!["group1", "group2"]
    );
    assert!(roles.groups_for_user("eve", Some("$admin")).expect("groups").is_empty());
    assert!(roles.groups_for_user("nobody", None).expect("groups").is_empty());
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_users_in_role(backend: Backend) {
    let fx = fixture(backend);
    let roles = &fx.roles;

    roles
        .add_roles_to_users(["eve", "joe"], "admin", "group1")
        .expect("add");
    roles.add_roles_to_users("bob", "user", "group1").expect("add");
    roles.add_roles_to_users("bob", "admin", "group2").expect("add");

    let ids = roles
        .users_in_role("admin", "group1", None)
        .expect("query")
        .ids()
        .expect("ids");
    assert_eq!(sorted(ids), vec!["eve", "joe"]);

    let ids = roles
        .users_in_role(vec!["admin", "user"], "group1", None)
        .expect("query")
        .ids()
        .expect("ids");
    assert_eq!(sorted(ids), vec!["bob", "eve", "joe"]);

    let options = QueryOptions::new()
        .sort_by("id", SortDirection::Descending)
        .limit(1)
        .projection(Projection::Exclude(vec!["username".to_string()]));
    let users = roles
        .users_in_role("admin", "group1", Some(options))
        .expect("query")
        .fetch()
        .expect("fetch");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, "joe");
    assert!(!users[0].profile.contains_key("username"));
    assert!(users[0].roles.is_some());
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_users_in_role_sorted_by_profile_field(backend: Backend) {
    let fx = fixture(backend);
    let (roles, store) = (&fx.roles, &fx.store);
    store
        .insert(UserRecord::new("amy").with_profile_field("username", "zed"))
        .expect("seed user");

    roles
        .add_roles_to_users(["eve", "bob", "joe", "amy"], "admin", "group1")
        .expect("add");

    let options = QueryOptions::new()
        .sort_by("username", SortDirection::Ascending)
        .projection(Projection::Include(vec!["username".to_string()]));
    let users = roles
        .users_in_role("admin", "group1", Some(options))
        .expect("query")
        .fetch()
        .expect("fetch");

    let names: Vec<_> = users
        .iter()
        .map(|user| user.profile["username"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(names, vec!["bob", "eve", "joe", "zed"]);
    assert!(users.iter().all(|user| user.roles.is_none()));
    assert!(users.iter().all(|user| user.profile.len() == 1));

    let options = QueryOptions::new()
        .sort_by("username", SortDirection::Descending)
        .skip(1)
        .limit(2);
    let ids = roles
        .users_in_role("admin", "group1", Some(options))
        .expect("query")
        .ids()
        .expect("ids");
    assert_eq!(ids, vec!["joe", "eve"]);
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_mixed_value_sort_order_matches_across_backends(backend: Backend) {
    let fx = fixture(backend);
    let store = &fx.store;
    let seeds = [
        UserRecord::new("p1").with_profile_field("rank", "a"),
        UserRecord::new("p2").with_profile_field("rank", 10),
        UserRecord::new("p3"),
        UserRecord::new("p4").with_profile_field("rank", true),
        UserRecord::new("p5").with_profile_field("rank", 2),
        UserRecord::new("p6").with_profile_field("rank", serde_json::Value::Null),
    ];
    let ids: Vec<String> = seeds.iter().map(|user| user.id.clone()).collect();
    for user in seeds {
        store.insert(user).expect("seed user");
    }

    let find_sorted = |key: SortKey| {
        let options = FindOptions {
            sort: vec![key],
            ..FindOptions::default()
        };
        store
            .find(&UserFilter::by_ids(ids.clone()), &options)
            .expect("find")
            .ids()
            .expect("ids")
    };

    assert_eq!(
        find_sorted(SortKey::ascending("rank")),
        vec!["p3", "p6", "p4", "p5", "p2", "p1"]
    );
    assert_eq!(
        find_sorted(SortKey::descending("rank")),
        vec!["p1", "p2", "p5", "p4", "p3", "p6"]
    );
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_users_in_role_cursor_reads_on_iteration(backend: Backend) {
    let fx = fixture(backend);
    let roles = &fx.roles;
    roles
        .add_roles_to_users(["eve", "bob", "joe"], "admin", "group1")
        .expect("add");

    let cursor = roles
        .users_in_role("admin", "group1", Some(QueryOptions::new().limit(1)))
        .expect("query");
    roles
        .set_roles_for_users(["eve", "bob", "joe"], Vec::<String>::new(), "group1")
        .expect("revoke");

    assert!(cursor.fetch().expect("fetch").is_empty());
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_concurrent_grants_all_land(backend: Backend) {
    const WORKERS: usize = 8;

    let fx = fixture(backend);
    let roles = Arc::new(RoleAssignmentService::new(Arc::clone(&fx.store)));

    let handles: Vec<_> = (0..WORKERS)
        .map(|n| {
            let roles = Arc::clone(&roles);
            thread::spawn(move || {
                roles
                    .add_roles_to_users("eve", format!("role{n}"), "shared")
                    .expect("grant shared role");
                roles
                    .add_roles_to_users("eve", "member", &format!("team{n}"))
                    .expect("grant team role");
                // Every write touches both users at once.
                roles
                    .set_roles_for_users(["bob", "joe"], vec![format!("pair{n}")], "pair")
                    .expect("set pair roles");
                assert!(
                    roles
                        .user_has_any_role("eve", format!("role{n}"), "shared")
                        .expect("check")
                );
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    let expected: Vec<String> = sorted((0..WORKERS).map(|n| format!("role{n}")).collect());
    assert_eq!(sorted(roles.roles_for_user("eve", "shared").expect("roles")), expected);

    let teams = roles.groups_for_user("eve", Some("member")).expect("groups");
    assert_eq!(teams.len(), WORKERS);

    let bob = roles.roles_for_user("bob", "pair").expect("roles");
    let joe = roles.roles_for_user("joe", "pair").expect("roles");
    assert_eq!(bob.len(), 1);
    assert_eq!(bob, joe);
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_mixed_role_mode(backend: Backend) {
    let fx = fixture(backend);
    let (roles, store) = (&fx.roles, &fx.store);

    store
        .insert(UserRecord::new("legacy").with_roles(RolesField::ungrouped(["admin"])))
        .expect("seed legacy user");

    let err = roles
        .add_roles_to_users("legacy", "user", "group1")
        .expect_err("mixed mode");
    assert!(matches!(err, Error::MixedRoleMode));
    assert!(matches!(
        roles.set_roles_for_users("legacy", "user", "group1"),
        Err(Error::MixedRoleMode)
    ));
    assert!(matches!(
        roles.remove_roles_from_users("legacy", "admin", "group1"),
        Err(Error::MixedRoleMode)
    ));

    // A multi-user update touching the legacy user changes nobody.
    assert!(matches!(
        roles.add_roles_to_users(["eve", "legacy"], "user", "group1"),
        Err(Error::MixedRoleMode)
    ));
    assert!(roles.roles_for_user("eve", "group1").expect("roles").is_empty());

    assert!(!roles.user_has_any_role("legacy", "admin", "group1").expect("check"));
    assert!(roles.groups_for_user("legacy", None).expect("groups").is_empty());
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::Sqlite ; "sqlite")]
fn test_publication(backend: Backend) {
    let fx = fixture(backend);
    let (roles, store) = (&fx.roles, &fx.store);
    roles.add_roles_to_users("eve", "admin", "group1").expect("add");

    let publication = RolesPublication::new(Arc::clone(store));
    assert!(publication.publish(None).expect("publish").is_ready());

    let documents = publication
        .publish(Some("eve"))
        .expect("publish")
        .into_documents()
        .expect("documents");
    assert_eq!(documents.len(), 1);
    assert_eq!(
        documents[0].roles,
        Some(RolesField::grouped().with_group("group1", ["admin"]))
    );
    assert!(documents[0].profile.is_empty());
}

#[test]
fn test_sqlite_roles_survive_reopen() {
    let dir = TempDir::new().expect("temp dir");
    let config = RolesConfig::default().with_sqlite_path(dir.path().join("users.db"));

    {
        let roles = RoleAssignmentService::from_config(&config).expect("service");
        roles
            .store()
            .insert(UserRecord::new("eve"))
            .expect("seed user");
        roles
            .add_roles_to_users("eve", ["admin", "user"], "group1")
            .expect("add roles");
    }

    let roles = RoleAssignmentService::from_config(&config).expect("reopen");
    assert_eq!(
        sorted(roles.roles_for_user("eve", "group1").expect("roles")),
        vec!["admin", "user"]
    );
}

#[test]
fn test_memory_config_builds_empty_store() {
    let config = RolesConfig::default().with_memory_store();
    let roles = RoleAssignmentService::from_config(&config).expect("service");
    assert_eq!(roles.read_preference(), config.read_preference);
    assert!(roles.roles_for_user("eve", "group1").expect("roles").is_empty());
}
