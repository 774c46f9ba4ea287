mod common;

use common::{
    fast_config, ids, key_provider, member_ids, seed_catalog, seed_hosts, seed_set, set_version,
    setup, CATALOG, SCOPE, SET,
};
use hostset_core::{
    compute_changes, get_host_set, ChangeAction, FetchLimit, Host, HostMembership,
    MembershipError, SetMemberRepository, SqliteBackend, SqliteSetMemberRepository,
};

#[test]
fn add_members_to_empty_set_bumps_version_once() {
    let mut conn = setup();
    let before = set_version(&conn, SET);

    {
        let mut repo =
            SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();
        repo.add_set_members(SCOPE, SET, &ids(&["h1", "h2"]))
            .unwrap();

        let hosts: Vec<Host> = repo.fetch_members(SET, FetchLimit::Unlimited).unwrap();
        let fetched: Vec<&str> = hosts.iter().map(|h| h.public_id.as_str()).collect();
        assert_eq!(fetched, vec!["h1", "h2"]);
        assert_eq!(hosts[0].address, "h1.internal");
        assert_eq!(hosts[0].catalog_id, CATALOG);
    }

    assert_eq!(set_version(&conn, SET), before + 1);
}

#[test]
fn repeated_adds_return_union_with_each_host_once() {
    let mut conn = setup();
    let before = set_version(&conn, SET);
    let mut repo =
        SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();

    repo.add_set_members(SCOPE, SET, &ids(&["h1", "h2"]))
        .unwrap();
    repo.add_set_members(SCOPE, SET, &ids(&["h4", "h3", "h4"]))
        .unwrap();

    let hosts: Vec<Host> = repo.fetch_members(SET, FetchLimit::Unlimited).unwrap();
    let fetched: Vec<&str> = hosts.iter().map(|h| h.public_id.as_str()).collect();
    assert_eq!(fetched, vec!["h1", "h2", "h3", "h4"]);

    let set = repo.get_host_set(SET).unwrap().unwrap();
    assert_eq!(set.version, before + 2);
}

#[test]
fn missing_identifiers_are_rejected_without_touching_storage() {
    let mut conn = setup();
    let before = set_version(&conn, SET);
    {
        let mut repo =
            SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();

        let err = repo.add_set_members("", SET, &ids(&["h1"])).unwrap_err();
        assert!(matches!(err, MembershipError::InvalidArgument("no scope id")));

        let err = repo.add_set_members(SCOPE, "", &ids(&["h1"])).unwrap_err();
        assert!(matches!(err, MembershipError::InvalidArgument("no set id")));

        let err = repo.add_set_members(SCOPE, SET, &[]).unwrap_err();
        assert!(matches!(err, MembershipError::InvalidArgument("no host ids")));

        let err = repo.delete_set_members(SCOPE, SET, &[]).unwrap_err();
        assert!(matches!(err, MembershipError::InvalidArgument("no host ids")));

        let err = repo
            .set_set_members(SCOPE, SET, &ids(&["h1", ""]))
            .unwrap_err();
        assert!(matches!(err, MembershipError::InvalidArgument("empty host id")));
    }

    assert_eq!(set_version(&conn, SET), before);
    assert!(member_ids(&conn, SET).is_empty());
}

#[test]
fn unknown_set_is_not_found() {
    let mut conn = setup();
    let mut repo =
        SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();

    let err = repo
        .add_set_members(SCOPE, "hs_missing", &ids(&["h1"]))
        .unwrap_err();
    assert!(matches!(err, MembershipError::NotFound(ref id) if id == "hs_missing"));
    assert!(!err.is_retryable());

    let err = repo
        .set_set_members(SCOPE, "hs_missing", &ids(&["h1"]))
        .unwrap_err();
    assert!(matches!(err, MembershipError::NotFound(_)));
}

#[test]
fn adding_an_existing_member_is_a_storage_failure() {
    let mut conn = setup();
    {
        let mut repo =
            SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();
        repo.add_set_members(SCOPE, SET, &ids(&["h1"])).unwrap();

        let err = repo
            .add_set_members(SCOPE, SET, &ids(&["h1", "h2"]))
            .unwrap_err();
        assert_eq!(err.code(), "constraint_violation");
        match err {
            MembershipError::Storage(db_err) => assert!(db_err.is_constraint_violation()),
            other => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(member_ids(&conn, SET), ids(&["h1"]));
    assert_eq!(set_version(&conn, SET), 2);
}

#[test]
fn host_from_another_catalog_cannot_join() {
    let mut conn = setup();
    seed_catalog(&conn, "hc_other", SCOPE);
    seed_hosts(&conn, "hc_other", &["foreign"]);

    {
        let mut repo =
            SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();
        let err = repo
            .add_set_members(SCOPE, SET, &ids(&["foreign"]))
            .unwrap_err();
        assert!(matches!(err, MembershipError::Storage(_)));
    }

    assert!(member_ids(&conn, SET).is_empty());
    assert_eq!(set_version(&conn, SET), 1);
}

#[test]
fn delete_members_returns_count_and_bumps_version() {
    let mut conn = setup();
    let mut repo =
        SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();
    repo.add_set_members(SCOPE, SET, &ids(&["h1", "h2", "h3"]))
        .unwrap();

    let deleted = repo
        .delete_set_members(SCOPE, SET, &ids(&["h1", "h3"]))
        .unwrap();
    assert_eq!(deleted, 2);

    let hosts: Vec<Host> = repo.fetch_members(SET, FetchLimit::Unlimited).unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].public_id, "h2");
    assert_eq!(repo.get_host_set(SET).unwrap().unwrap().version, 3);
}

#[test]
fn deleting_a_non_member_is_an_inconsistency() {
    let mut conn = setup();
    {
        let mut repo =
            SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();
        repo.add_set_members(SCOPE, SET, &ids(&["h1"])).unwrap();

        let err = repo
            .delete_set_members(SCOPE, SET, &ids(&["h1", "h2"]))
            .unwrap_err();
        assert!(matches!(err, MembershipError::Inconsistency(_)));
    }

    assert_eq!(member_ids(&conn, SET), ids(&["h1"]));
    assert_eq!(set_version(&conn, SET), 2);
}

#[test]
fn set_members_reconciles_adds_and_deletes() {
    let mut conn = setup();
    let mut repo =
        SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();
    repo.add_set_members(SCOPE, SET, &ids(&["h1", "h2"]))
        .unwrap();

    let changed = repo
        .set_set_members(SCOPE, SET, &ids(&["h2", "h3", "h4"]))
        .unwrap();
    assert_eq!(changed, 3);

    let hosts: Vec<Host> = repo.fetch_members(SET, FetchLimit::Unlimited).unwrap();
    let fetched: Vec<&str> = hosts.iter().map(|h| h.public_id.as_str()).collect();
    assert_eq!(fetched, vec!["h2", "h3", "h4"]);
    assert_eq!(repo.get_host_set(SET).unwrap().unwrap().version, 3);
}

#[test]
fn set_members_with_same_list_twice_is_a_no_op() {
    let mut conn = setup();
    let mut repo =
        SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();
    let desired = ids(&["h1", "h2", "h3"]);

    assert_eq!(repo.set_set_members(SCOPE, SET, &desired).unwrap(), 3);
    let version_after_first = repo.get_host_set(SET).unwrap().unwrap().version;

    assert_eq!(repo.set_set_members(SCOPE, SET, &desired).unwrap(), 0);
    assert_eq!(
        repo.get_host_set(SET).unwrap().unwrap().version,
        version_after_first
    );
}

#[test]
fn set_members_with_empty_list_removes_everyone() {
    let mut conn = setup();
    let mut repo =
        SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();
    repo.add_set_members(SCOPE, SET, &ids(&["h1", "h2"]))
        .unwrap();
    let before = repo.get_host_set(SET).unwrap().unwrap().version;

    let changed = repo.set_set_members(SCOPE, SET, &[]).unwrap();
    assert_eq!(changed, 2);

    let hosts: Vec<Host> = repo.fetch_members(SET, FetchLimit::Unlimited).unwrap();
    assert!(hosts.is_empty());
    assert_eq!(repo.get_host_set(SET).unwrap().unwrap().version, before + 1);

    assert_eq!(repo.set_set_members(SCOPE, SET, &[]).unwrap(), 0);
    assert_eq!(repo.get_host_set(SET).unwrap().unwrap().version, before + 1);
}

#[test]
fn duplicate_desired_ids_collapse_to_one_change() {
    let mut conn = setup();
    let mut repo =
        SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();

    let changed = repo
        .set_set_members(SCOPE, SET, &ids(&["h1", "h1", "h2", "h1"]))
        .unwrap();
    assert_eq!(changed, 2);
    let hosts: Vec<Host> = repo.fetch_members(SET, FetchLimit::Unlimited).unwrap();
    assert_eq!(hosts.len(), 2);
}

#[test]
fn diff_engine_orders_deletes_before_adds() {
    let mut conn = setup();
    {
        let mut repo =
            SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();
        repo.add_set_members(SCOPE, SET, &ids(&["h1", "h3", "h5"]))
            .unwrap();
    }

    let changes =
        compute_changes(&SqliteBackend, &conn, SET, &ids(&["h4", "h3", "h2", "h4"])).unwrap();
    let rendered: Vec<(ChangeAction, &str)> = changes
        .iter()
        .map(|change| (change.action, change.host_id.as_str()))
        .collect();
    assert_eq!(
        rendered,
        vec![
            (ChangeAction::Delete, "h1"),
            (ChangeAction::Delete, "h5"),
            (ChangeAction::Add, "h2"),
            (ChangeAction::Add, "h4"),
        ]
    );

    let unchanged = compute_changes(&SqliteBackend, &conn, SET, &ids(&["h1", "h3", "h5"])).unwrap();
    assert!(unchanged.is_empty());

    let remove_all = compute_changes(&SqliteBackend, &conn, SET, &[]).unwrap();
    assert_eq!(remove_all.len(), 3);
    assert!(remove_all
        .iter()
        .all(|change| change.action == ChangeAction::Delete));
}

#[test]
fn fetch_members_honours_limit() {
    let mut conn = setup();
    let mut repo =
        SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();
    repo.add_set_members(SCOPE, SET, &ids(&["h1", "h2", "h3", "h4"]))
        .unwrap();

    let limited: Vec<Host> = repo.fetch_members(SET, FetchLimit::Limited(2)).unwrap();
    let fetched: Vec<&str> = limited.iter().map(|h| h.public_id.as_str()).collect();
    assert_eq!(fetched, vec!["h1", "h2"]);

    let none: Vec<Host> = repo.fetch_members(SET, FetchLimit::Limited(0)).unwrap();
    assert!(none.is_empty());

    let all: Vec<Host> = repo.fetch_members(SET, FetchLimit::Unlimited).unwrap();
    assert_eq!(all.len(), 4);

    let err = repo
        .fetch_members::<Host>("", FetchLimit::Unlimited)
        .unwrap_err();
    assert!(matches!(err, MembershipError::InvalidArgument("no set id")));
}

#[test]
fn host_membership_lists_every_set_sorted() {
    let mut conn = setup();
    seed_set(&conn, "hs_a", CATALOG, SCOPE);
    {
        let mut repo =
            SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();
        repo.add_set_members(SCOPE, SET, &ids(&["h1", "h2"]))
            .unwrap();
        repo.add_set_members(SCOPE, "hs_a", &ids(&["h1"])).unwrap();

        let memberships: Vec<HostMembership> =
            repo.fetch_members(SET, FetchLimit::Unlimited).unwrap();
        assert_eq!(memberships.len(), 2);
        assert_eq!(memberships[0].host_id, "h1");
        assert_eq!(
            memberships[0].set_ids,
            vec!["hs_1234567890".to_string(), "hs_a".to_string()]
        );
        assert_eq!(memberships[1].set_ids, vec![SET.to_string()]);
    }

    let set = get_host_set(&conn, "hs_a").unwrap().unwrap();
    assert_eq!(set.version, 2);
    assert_eq!(set.scope_id, SCOPE);
    assert!(get_host_set(&conn, "hs_missing").unwrap().is_none());
}

#[test]
fn host_membership_keeps_set_ids_with_separator_characters() {
    let mut conn = setup();
    seed_set(&conn, "hs_a|b", CATALOG, SCOPE);
    seed_set(&conn, "hs_\"quoted\",c", CATALOG, SCOPE);
    let mut repo =
        SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();
    repo.add_set_members(SCOPE, "hs_a|b", &ids(&["h1"])).unwrap();
    repo.add_set_members(SCOPE, "hs_\"quoted\",c", &ids(&["h1"]))
        .unwrap();

    let memberships: Vec<HostMembership> =
        repo.fetch_members("hs_a|b", FetchLimit::Unlimited).unwrap();
    assert_eq!(memberships.len(), 1);
    assert_eq!(
        memberships[0].set_ids,
        vec!["hs_\"quoted\",c".to_string(), "hs_a|b".to_string()]
    );
}

#[test]
fn set_at_highest_version_rejects_mutation_without_changes() {
    let mut conn = setup();
    conn.execute(
        "UPDATE host_sets SET version = ?1 WHERE public_id = ?2;",
        rusqlite::params![u32::MAX, SET],
    )
    .unwrap();

    {
        let mut repo =
            SqliteSetMemberRepository::try_new(&mut conn, key_provider(), &fast_config()).unwrap();
        let err = repo
            .add_set_members(SCOPE, SET, &ids(&["h1"]))
            .unwrap_err();
        assert!(matches!(err, MembershipError::Inconsistency(_)));
        assert!(!err.is_retryable());
    }

    assert_eq!(set_version(&conn, SET), u32::MAX);
    assert!(member_ids(&conn, SET).is_empty());
}
