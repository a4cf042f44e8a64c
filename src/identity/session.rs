use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;
use tracing::debug;

use super::principal::Principal;

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub principal: Principal,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

fn gen_token() -> String {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Token-keyed in-memory session table with TTL expiry. The surrounding HTTP
/// layer owns the cookie transport; this type only maps opaque tokens to
/// principals.
pub struct SessionManager {
    ttl: Duration,
    sessions: RwLock<HashMap<SessionToken, Session>>,
    user_index: RwLock<HashMap<i64, HashSet<SessionToken>>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(60 * 60))
    }
}

impl SessionManager {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
            user_index: RwLock::new(HashMap::new()),
        }
    }

    pub fn issue(&self, principal: Principal) -> Session {
        let now = Instant::now();
        let token = gen_token();
        let session = Session {
            token: token.clone(),
            principal: principal.clone(),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.write().insert(token.clone(), session.clone());
        self.user_index
            .write()
            .entry(principal.user_id)
            .or_default()
            .insert(token);
        debug!(target: "userposts::session", "session.issue user_id={} ttl_secs={}", principal.user_id, self.ttl.as_secs());
        session
    }

    /// Resolve a token to its principal, pruning the entry when expired.
    pub fn validate(&self, token: &str) -> Option<Principal> {
        let now = Instant::now();
        let mut drop_key: Option<String> = None;
        let out = {
            let map = self.sessions.read();
            if let Some(session) = map.get(token) {
                if session.expires_at > now {
                    Some(session.principal.clone())
                } else {
                    drop_key = Some(token.to_string());
                    None
                }
            } else {
                None
            }
        };
        if let Some(key) = drop_key {
            self.sessions.write().remove(&key);
        }
        out
    }

    pub fn logout(&self, token: &str) -> bool {
        if let Some(session) = self.sessions.write().remove(token) {
            let mut idx = self.user_index.write();
            if let Some(set) = idx.get_mut(&session.principal.user_id) {
                set.remove(token);
            }
            true
        } else {
            false
        }
    }

    /// Drop every live session of one user, e.g. when the account is
    /// destroyed. Returns the number of sessions removed.
    pub fn revoke_user(&self, user_id: i64) -> usize {
        let mut count = 0usize;
        if let Some(tokens) = self.user_index.write().remove(&user_id) {
            let mut sessions = self.sessions.write();
            for token in tokens {
                if sessions.remove(&token).is_some() {
                    count += 1;
                }
            }
        }
        debug!(target: "userposts::session", "session.revoke user_id={} count={}", user_id, count);
        count
    }
}
