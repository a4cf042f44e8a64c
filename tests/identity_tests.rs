use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;

use userposts::error::AppError;
use userposts::identity::{
    AuthProvider, LocalAuthProvider, LoginRequest, PasswordVerifier, PlaintextVerifier, Principal,
    RequestContext, SessionManager,
};
use userposts::posts;
use userposts::storage::{NewPost, NewUser, SharedStore, User};

fn seed_user(store: &SharedStore, username: &str, password: &str) -> User {
    let guard = store.0.lock();
    guard
        .create_user(NewUser {
            username: username.to_string(),
            password: password.to_string(),
            full_name: "Petros Petrou".to_string(),
            phone: "1234567".to_string(),
        })
        .unwrap()
}

fn provider(store: &SharedStore, sessions: Arc<SessionManager>) -> LocalAuthProvider {
    LocalAuthProvider::new(store.clone(), sessions, Arc::new(PlaintextVerifier))
}

fn login_req(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
        return_to: None,
    }
}

#[test]
fn login_issues_a_resolvable_session() {
    let dir = tempdir().unwrap();
    let store = SharedStore::new(dir.path()).unwrap();
    let user = seed_user(&store, "petros", "secret");
    let sessions = Arc::new(SessionManager::default());
    let auth = provider(&store, sessions.clone());

    let resp = auth.login(&login_req("petros", "secret")).unwrap();
    let principal = sessions.validate(&resp.session.token).unwrap();
    assert_eq!(principal.user_id, user.id);
    assert_eq!(principal.username, "petros");
    assert_eq!(principal.full_name, "Petros Petrou");
}

#[test]
fn login_rejects_bad_credentials_uniformly() {
    let dir = tempdir().unwrap();
    let store = SharedStore::new(dir.path()).unwrap();
    seed_user(&store, "petros", "secret");
    let auth = provider(&store, Arc::new(SessionManager::default()));

    // Unknown username and wrong password fail the same way.
    let unknown = auth.login(&login_req("nobody", "secret")).unwrap_err();
    assert!(matches!(unknown, AppError::InvalidCredentials));
    let wrong = auth.login(&login_req("petros", "nope")).unwrap_err();
    assert!(matches!(wrong, AppError::InvalidCredentials));
}

#[test]
fn expired_session_is_as_good_as_no_session() {
    let dir = tempdir().unwrap();
    let store = SharedStore::new(dir.path()).unwrap();
    seed_user(&store, "petros", "secret");
    let sessions = Arc::new(SessionManager::with_ttl(Duration::ZERO));
    let auth = provider(&store, sessions.clone());

    let resp = auth.login(&login_req("petros", "secret")).unwrap();
    assert!(sessions.validate(&resp.session.token).is_none());
}

#[test]
fn a_custom_verifier_replaces_the_comparison() {
    struct ReversedVerifier;
    impl PasswordVerifier for ReversedVerifier {
        fn verify(&self, stored: &str, supplied: &str) -> bool {
            stored.chars().rev().collect::<String>() == supplied
        }
    }

    let dir = tempdir().unwrap();
    let store = SharedStore::new(dir.path()).unwrap();
    seed_user(&store, "petros", "secret");
    let auth = LocalAuthProvider::new(
        store.clone(),
        Arc::new(SessionManager::default()),
        Arc::new(ReversedVerifier),
    );

    assert!(auth.login(&login_req("petros", "terces")).is_ok());
    assert!(matches!(
        auth.login(&login_req("petros", "secret")).unwrap_err(),
        AppError::InvalidCredentials
    ));
}

#[test]
fn anonymous_create_asks_for_login_with_the_destination() {
    let dir = tempdir().unwrap();
    let store = SharedStore::new(dir.path()).unwrap();
    let user = seed_user(&store, "petros", "secret");
    let ctx = RequestContext::anonymous(format!("/users/{}/posts", user.id));

    let err = posts::create(&store, &ctx, user.id, "hello").unwrap_err();
    match err {
        AppError::AuthenticationRequired { return_to } => {
            assert_eq!(return_to, format!("/users/{}/posts", user.id));
        }
        other => panic!("expected AuthenticationRequired, got {:?}", other),
    }
    assert_eq!(posts::index_all(&store, None).unwrap().len(), 0);
}

#[test]
fn a_denied_create_never_touches_validation() {
    let dir = tempdir().unwrap();
    let store = SharedStore::new(dir.path()).unwrap();
    let owner = seed_user(&store, "petros", "secret");
    let intruder = seed_user(&store, "maria1", "secret");
    let ctx = RequestContext::authenticated(
        Principal::from(&intruder),
        format!("/users/{}/posts", owner.id),
    );

    // The title is invalid too, but ownership is checked first.
    let err = posts::create(&store, &ctx, owner.id, "").unwrap_err();
    assert!(matches!(err, AppError::Denied { .. }));
}

#[test]
fn the_owner_creates_and_destroys_their_posts() {
    let dir = tempdir().unwrap();
    let store = SharedStore::new(dir.path()).unwrap();
    let owner = seed_user(&store, "petros", "secret");
    let ctx = RequestContext::authenticated(
        Principal::from(&owner),
        format!("/users/{}/posts", owner.id),
    );

    let created = posts::create(&store, &ctx, owner.id, "hello").unwrap();
    assert_eq!(created.user_id, owner.id);

    let removed = posts::destroy(&store, &ctx, owner.id, created.id).unwrap();
    assert_eq!(removed, created);
    assert!(posts::index_all(&store, None).unwrap().is_empty());
}

#[test]
fn destroy_authorizes_against_the_path_owner_not_the_post() {
    let dir = tempdir().unwrap();
    let store = SharedStore::new(dir.path()).unwrap();
    let victim = seed_user(&store, "petros", "secret");
    let caller = seed_user(&store, "maria1", "secret");
    let target = {
        let guard = store.0.lock();
        guard
            .create_post(NewPost {
                user_id: Some(victim.id),
                title: "not yours".to_string(),
            })
            .unwrap()
    };

    // Addressing the victim's path is refused outright.
    let honest = RequestContext::authenticated(
        Principal::from(&caller),
        format!("/users/{}/posts/{}", victim.id, target.id),
    );
    assert!(matches!(
        posts::destroy(&store, &honest, victim.id, target.id).unwrap_err(),
        AppError::Denied { .. }
    ));

    // Addressing it under the caller's own path succeeds: the check is scoped
    // to the path's owner id and does not consult the post record.
    let crafted = RequestContext::authenticated(
        Principal::from(&caller),
        format!("/users/{}/posts/{}", caller.id, target.id),
    );
    let removed = posts::destroy(&store, &crafted, caller.id, target.id).unwrap();
    assert_eq!(removed.user_id, victim.id);
}
