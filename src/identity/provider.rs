use std::sync::Arc;

use tracing::info;

use crate::error::AppError;
use crate::storage::SharedStore;

use super::principal::Principal;
use super::session::{Session, SessionManager};

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Destination to resume at after a successful login.
    pub return_to: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub session: Session,
}

/// Compares a supplied password against the stored one. Kept behind a trait
/// so the comparison can be swapped for a salted-hash scheme without touching
/// any call site.
pub trait PasswordVerifier: Send + Sync {
    fn verify(&self, stored: &str, supplied: &str) -> bool;
}

/// Exact-match comparison. Known weakness: passwords are stored and compared
/// in the clear.
pub struct PlaintextVerifier;

impl PasswordVerifier for PlaintextVerifier {
    fn verify(&self, stored: &str, supplied: &str) -> bool {
        stored == supplied
    }
}

pub trait AuthProvider: Send + Sync {
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AppError>;
}

/// Resolves credentials against the local user store and issues a session on
/// success.
pub struct LocalAuthProvider {
    store: SharedStore,
    sessions: Arc<SessionManager>,
    verifier: Arc<dyn PasswordVerifier>,
}

impl LocalAuthProvider {
    pub fn new(
        store: SharedStore,
        sessions: Arc<SessionManager>,
        verifier: Arc<dyn PasswordVerifier>,
    ) -> Self {
        Self {
            store,
            sessions,
            verifier,
        }
    }
}

impl AuthProvider for LocalAuthProvider {
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AppError> {
        let user = {
            let guard = self.store.0.lock();
            guard.find_user_by_username(&req.username)?
        };
        let Some(user) = user else {
            return Err(AppError::invalid_credentials());
        };
        if !self.verifier.verify(&user.password, &req.password) {
            return Err(AppError::invalid_credentials());
        }
        let session = self.sessions.issue(Principal::from(&user));
        info!(target: "userposts::auth", "auth.login user_id={} username='{}'", user.id, user.username);
        Ok(LoginResponse { session })
    }
}
