use super::Principal;

/// Explicit per-request identity handed into every operation instead of any
/// ambient "current user" state. `path` is the original destination,
/// preserved so a denied caller can be resumed there after re-authenticating.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub path: String,
}

impl RequestContext {
    pub fn anonymous<S: Into<String>>(path: S) -> Self {
        Self {
            principal: None,
            path: path.into(),
        }
    }

    pub fn authenticated<S: Into<String>>(principal: Principal, path: S) -> Self {
        Self {
            principal: Some(principal),
            path: path.into(),
        }
    }
}
