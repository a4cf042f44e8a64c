use crate::error::AppError;

use super::{Principal, RequestContext};

/// Pure ownership policy: a caller may manage posts under a user's account
/// iff it is authenticated and is that very user.
pub fn can_manage(current: Option<&Principal>, target_user_id: i64) -> bool {
    match current {
        Some(principal) => principal.user_id == target_user_id,
        None => false,
    }
}

/// First named check of the request pipeline: resolve the caller, or fail
/// with a login redirect that preserves the original destination.
pub fn authenticate(ctx: &RequestContext) -> Result<&Principal, AppError> {
    ctx.principal
        .as_ref()
        .ok_or_else(|| AppError::auth_required(&ctx.path))
}

/// Second named check: the authenticated caller must be the owner named in
/// the request path. The check is deliberately path-scoped and does not
/// inspect the target resource itself.
pub fn authorize(ctx: &RequestContext, target_user_id: i64) -> Result<&Principal, AppError> {
    let principal = authenticate(ctx)?;
    if can_manage(Some(principal), target_user_id) {
        Ok(principal)
    } else {
        Err(AppError::denied(&ctx.path))
    }
}
