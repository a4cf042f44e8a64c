//! Post operations: the listing/feed queries and the authorized
//! create/delete path. Handlers stay thin; everything here takes an explicit
//! [`RequestContext`] rather than consulting any ambient session state.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::identity::{authorize, RequestContext};
use crate::storage::{NewPost, Post, SharedStore};

/// Reduced projection for syndication-style listings: a read-only
/// denormalized join between a post and its owning user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: i64,
    pub user_id: i64,
    pub full_name: String,
    pub title: String,
    pub created_at: i64,
}

/// All posts of one author, newest first. Fails if the author does not exist.
pub fn index(store: &SharedStore, user_id: i64) -> AppResult<Vec<Post>> {
    let guard = store.0.lock();
    if guard.find_user(user_id)?.is_none() {
        return Err(AppError::not_found(format!("user {} not found", user_id)));
    }
    Ok(guard.posts_by_user(user_id)?)
}

/// All posts across all users, newest first, optionally truncated to the
/// `limit` most recent.
pub fn index_all(store: &SharedStore, limit: Option<usize>) -> AppResult<Vec<Post>> {
    let guard = store.0.lock();
    Ok(guard.all_posts(limit)?)
}

/// Same ordering and limit as [`index_all`], projected down to the feed field
/// set {id, user_id, full_name, title, created_at}.
pub fn feed_index_all(store: &SharedStore, limit: Option<usize>) -> AppResult<Vec<FeedEntry>> {
    let guard = store.0.lock();
    let posts = guard.all_posts(limit)?;
    let full_names: HashMap<i64, String> = guard
        .list_users()?
        .into_iter()
        .map(|u| (u.id, u.full_name))
        .collect();
    let mut entries = Vec::with_capacity(posts.len());
    for post in posts {
        let Some(full_name) = full_names.get(&post.user_id) else {
            // The store never lets a post outlive its owner, so this is table
            // corruption, not a caller mistake.
            error!(target: "userposts::posts", "feed_index_all: post {} references missing user {}", post.id, post.user_id);
            return Err(AppError::persistence());
        };
        entries.push(FeedEntry {
            id: post.id,
            user_id: post.user_id,
            full_name: full_name.clone(),
            title: post.title,
            created_at: post.created_at,
        });
    }
    Ok(entries)
}

/// Number of posts a caller has not displayed yet: total minus `count`.
/// Deliberately unclamped, so the answer is negative when the caller claims
/// to show more posts than exist.
pub fn more_posts(store: &SharedStore, count: i64) -> AppResult<i64> {
    let guard = store.0.lock();
    Ok(guard.count_posts()? - count)
}

pub fn show(store: &SharedStore, post_id: i64) -> AppResult<Post> {
    let guard = store.0.lock();
    guard
        .find_post(post_id)?
        .ok_or_else(|| AppError::not_found(format!("post {} not found", post_id)))
}

/// Create a post under `owner_id`. The caller must be authenticated as that
/// exact user; the payload is not even validated for a denied caller.
pub fn create(
    store: &SharedStore,
    ctx: &RequestContext,
    owner_id: i64,
    title: &str,
) -> AppResult<Post> {
    authorize(ctx, owner_id)?;
    let candidate = NewPost {
        user_id: Some(owner_id),
        title: title.to_string(),
    };
    let guard = store.0.lock();
    let post = guard.create_post(candidate)?;
    info!(target: "userposts::posts", "post.create id={} user_id={}", post.id, post.user_id);
    Ok(post)
}

/// Delete a post under `owner_id`. Authorization is scoped to the path's
/// owner id only: the post's own `user_id` is not re-checked against the
/// caller.
pub fn destroy(
    store: &SharedStore,
    ctx: &RequestContext,
    owner_id: i64,
    post_id: i64,
) -> AppResult<Post> {
    authorize(ctx, owner_id)?;
    let guard = store.0.lock();
    let post = guard.delete_post(post_id)?;
    info!(target: "userposts::posts", "post.destroy id={} user_id={}", post.id, post.user_id);
    Ok(post)
}
