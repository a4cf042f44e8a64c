use serde::{Deserialize, Serialize};

use crate::storage::User;

/// The resolved identity attached to a request once its session token has
/// been validated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            full_name: user.full_name.clone(),
        }
    }
}
