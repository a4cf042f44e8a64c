//! Identity, session and authorization for userposts.
//! Keep the public surface thin and split implementation across sub-modules.

mod authorizer;
mod principal;
mod provider;
mod request_context;
mod session;

pub use authorizer::{authenticate, authorize, can_manage};
pub use principal::Principal;
pub use provider::{
    AuthProvider, LocalAuthProvider, LoginRequest, LoginResponse, PasswordVerifier,
    PlaintextVerifier,
};
pub use request_context::RequestContext;
pub use session::{Session, SessionManager, SessionToken};
