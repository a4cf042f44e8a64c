use tempfile::tempdir;

use userposts::storage::{NewPost, NewUser, Store, StoreError};

fn valid_user(username: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        password: "secret".to_string(),
        full_name: "Petros Petrou".to_string(),
        phone: "1234567890".to_string(),
    }
}

#[test]
fn create_user_assigns_sequential_ids_and_persists() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();

    let first = store.create_user(valid_user("petros")).unwrap();
    let second = store.create_user(valid_user("maria1")).unwrap();
    assert_eq!(first.id, 1);
    assert_eq!(second.id, 2);

    // Reopen from disk and confirm the rows survived.
    let reopened = Store::new(dir.path()).unwrap();
    let found = reopened.find_user_by_username("petros").unwrap().unwrap();
    assert_eq!(found.id, 1);
    assert_eq!(found.full_name, "Petros Petrou");
}

#[test]
fn duplicate_usernames_are_rejected() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();
    store.create_user(valid_user("petros")).unwrap();

    let err = store.create_user(valid_user("petros")).unwrap_err();
    match err {
        StoreError::Validation(errors) => {
            let fields = errors.into_fields();
            assert_eq!(
                fields.get("username").map(Vec::as_slice),
                Some(&["has already been taken".to_string()][..])
            );
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[test]
fn invalid_sign_up_reports_every_failing_field() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();

    let err = store
        .create_user(NewUser {
            username: "x!".to_string(),
            password: "".to_string(),
            full_name: "p".to_string(),
            phone: "12ab".to_string(),
        })
        .unwrap_err();
    match err {
        StoreError::Validation(errors) => {
            let fields = errors.into_fields();
            assert!(fields.contains_key("username"));
            assert_eq!(
                fields.get("password").map(Vec::as_slice),
                Some(&["can't be blank".to_string()][..])
            );
            assert_eq!(
                fields.get("full_name").map(Vec::as_slice),
                Some(&["is invalid".to_string()][..])
            );
            assert_eq!(
                fields.get("phone").map(Vec::as_slice),
                Some(&["has to have 7 to 20 digits".to_string()][..])
            );
        }
        other => panic!("expected validation failure, got {:?}", other),
    }

    // Nothing was persisted.
    assert!(store.find_user_by_username("x!").unwrap().is_none());
}

#[test]
fn create_post_requires_a_live_owner() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();

    let err = store
        .create_post(NewPost {
            user_id: Some(99),
            title: "orphan".to_string(),
        })
        .unwrap_err();
    match err {
        StoreError::ForeignKey { user_id } => assert_eq!(user_id, 99),
        other => panic!("expected foreign key failure, got {:?}", other),
    }
}

#[test]
fn post_titles_are_validated_before_the_owner_check() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();

    let blank = store
        .create_post(NewPost {
            user_id: Some(99),
            title: String::new(),
        })
        .unwrap_err();
    match blank {
        StoreError::Validation(errors) => {
            assert_eq!(
                errors.into_fields().get("title").map(Vec::as_slice),
                Some(&["can't be blank".to_string()][..])
            );
        }
        other => panic!("expected validation failure, got {:?}", other),
    }

    let long = store
        .create_post(NewPost {
            user_id: Some(99),
            title: "x".repeat(141),
        })
        .unwrap_err();
    match long {
        StoreError::Validation(errors) => {
            assert_eq!(
                errors.into_fields().get("title").map(Vec::as_slice),
                Some(&["is too long (maximum is 140 characters)".to_string()][..])
            );
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[test]
fn deleting_a_user_cascades_to_their_posts() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();
    let owner = store.create_user(valid_user("petros")).unwrap();
    let other = store.create_user(valid_user("maria1")).unwrap();
    store
        .create_post(NewPost {
            user_id: Some(owner.id),
            title: "mine".to_string(),
        })
        .unwrap();
    store
        .create_post(NewPost {
            user_id: Some(owner.id),
            title: "also mine".to_string(),
        })
        .unwrap();
    let kept = store
        .create_post(NewPost {
            user_id: Some(other.id),
            title: "hers".to_string(),
        })
        .unwrap();

    store.delete_user(owner.id).unwrap();

    assert!(store.find_user(owner.id).unwrap().is_none());
    let remaining = store.all_posts(None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, kept.id);

    let err = store.delete_user(owner.id).unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "user", .. }));
}

#[test]
fn delete_post_returns_the_removed_record() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();
    let owner = store.create_user(valid_user("petros")).unwrap();
    let created = store
        .create_post(NewPost {
            user_id: Some(owner.id),
            title: "ephemeral".to_string(),
        })
        .unwrap();

    let removed = store.delete_post(created.id).unwrap();
    assert_eq!(removed, created);
    assert!(store.find_post(created.id).unwrap().is_none());

    let err = store.delete_post(created.id).unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "post", .. }));
}

#[test]
fn list_users_orders_by_full_name() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();
    store
        .create_user(NewUser {
            full_name: "Zoe Papas".to_string(),
            ..valid_user("zoe12")
        })
        .unwrap();
    store
        .create_user(NewUser {
            full_name: "Anna Pavlou".to_string(),
            ..valid_user("anna1")
        })
        .unwrap();

    let names: Vec<String> = store
        .list_users()
        .unwrap()
        .into_iter()
        .map(|u| u.full_name)
        .collect();
    assert_eq!(names, vec!["Anna Pavlou", "Zoe Papas"]);
}
