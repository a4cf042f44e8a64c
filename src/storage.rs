//!
//! userposts storage module
//! ------------------------
//! On-disk store for users and posts using two small Parquet tables under a
//! configured root folder: `users.parquet` and `posts.parquet`. Tables are read
//! whole and rewritten whole on mutation, which keeps the write path trivially
//! consistent for the data sizes this service handles.
//!
//! Key responsibilities:
//! - Insert with validation: a record is persisted only if its full check set
//!   passes, and the failing fields are reported as a set.
//! - Referential integrity at the write boundary: a post whose `user_id` does
//!   not reference a live user is rejected with a distinguishable
//!   [`StoreError::ForeignKey`], never a validation failure.
//! - Cascading user deletion: a user's posts are removed in the same logical
//!   operation, so no orphaned post is ever observable.
//!
//! The public API centers around the `Store` type, wrapped in a thread-safe
//! `SharedStore` (`Arc<Mutex<Store>>`). All mutations happen under that single
//! lock, which is what makes the cascade atomic from the caller's point of
//! view.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::validation::{validate_post, validate_user, ValidationErrors};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: i64 },
    #[error("foreign key violation: posts.user_id={user_id} references no user")]
    ForeignKey { user_id: i64 },
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("parquet failure: {0}")]
    Parquet(#[from] PolarsError),
    #[error("corrupt table: {0}")]
    Corrupt(String),
}

/// A registered user. `id` is assigned at creation and immutable; records are
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Stored as provided and compared by exact match; never serialized out.
    #[serde(skip_serializing)]
    pub password: String,
    pub full_name: String,
    pub phone: String,
}

/// Candidate user fields as received from sign-up, before validation.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub phone: String,
}

/// A post. `created_at` is epoch milliseconds, set at creation, and is the
/// sole primary sort key for all listings.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub created_at: i64,
}

/// Candidate post fields before validation. `user_id` stays optional here so
/// the presence check is a real check.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub user_id: Option<i64>,
    pub title: String,
}

/// Newest-first ordering for all listings: `created_at` descending, then `id`
/// descending so rows created within the same millisecond still sort with the
/// later insert first.
pub fn newest_first(a: &Post, b: &Post) -> Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

/// On-disk storage handle for the user and post tables.
#[derive(Clone)]
pub struct Store {
    /// Root folder holding `users.parquet` and `posts.parquet`.
    root: PathBuf,
}

/// Thread-safe handle shared across handlers. All reads and writes go through
/// the single inner lock.
#[derive(Clone)]
pub struct SharedStore(pub Arc<Mutex<Store>>);

impl SharedStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        Ok(Self(Arc::new(Mutex::new(Store::new(root)?))))
    }
}

fn str_at(df: &DataFrame, name: &str, idx: usize) -> Result<String, StoreError> {
    match df.column(name)?.get(idx)? {
        AnyValue::String(s) => Ok(s.to_string()),
        AnyValue::StringOwned(s) => Ok(s.to_string()),
        other => Err(StoreError::Corrupt(format!(
            "column '{}' row {}: expected string, got {:?}",
            name, idx, other
        ))),
    }
}

fn i64_at(df: &DataFrame, name: &str, idx: usize) -> Result<i64, StoreError> {
    df.column(name)?.i64()?.get(idx).ok_or_else(|| {
        StoreError::Corrupt(format!("column '{}' row {}: null value", name, idx))
    })
}

impl Store {
    /// Create a new Store rooted at the given filesystem path.
    /// The directory is created if it does not already exist.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root_path(&self) -> &PathBuf {
        &self.root
    }

    fn users_path(&self) -> PathBuf {
        self.root.join("users.parquet")
    }

    fn posts_path(&self) -> PathBuf {
        self.root.join("posts.parquet")
    }

    fn read_users(&self) -> Result<Vec<User>, StoreError> {
        let path = self.users_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&path)?;
        let df = ParquetReader::new(file).finish()?;
        let mut users = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            users.push(User {
                id: i64_at(&df, "id", idx)?,
                username: str_at(&df, "username", idx)?,
                password: str_at(&df, "password", idx)?,
                full_name: str_at(&df, "full_name", idx)?,
                phone: str_at(&df, "phone", idx)?,
            });
        }
        Ok(users)
    }

    fn write_users(&self, users: &[User]) -> Result<(), StoreError> {
        let mut df = DataFrame::new(vec![
            Series::new("id".into(), users.iter().map(|u| u.id).collect::<Vec<i64>>()).into(),
            Series::new(
                "username".into(),
                users.iter().map(|u| u.username.clone()).collect::<Vec<String>>(),
            )
            .into(),
            Series::new(
                "password".into(),
                users.iter().map(|u| u.password.clone()).collect::<Vec<String>>(),
            )
            .into(),
            Series::new(
                "full_name".into(),
                users.iter().map(|u| u.full_name.clone()).collect::<Vec<String>>(),
            )
            .into(),
            Series::new(
                "phone".into(),
                users.iter().map(|u| u.phone.clone()).collect::<Vec<String>>(),
            )
            .into(),
        ])?;
        let mut file = fs::File::create(self.users_path())?;
        ParquetWriter::new(&mut file).finish(&mut df)?;
        Ok(())
    }

    fn read_posts(&self) -> Result<Vec<Post>, StoreError> {
        let path = self.posts_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&path)?;
        let df = ParquetReader::new(file).finish()?;
        let mut posts = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            posts.push(Post {
                id: i64_at(&df, "id", idx)?,
                user_id: i64_at(&df, "user_id", idx)?,
                title: str_at(&df, "title", idx)?,
                created_at: i64_at(&df, "created_at", idx)?,
            });
        }
        Ok(posts)
    }

    fn write_posts(&self, posts: &[Post]) -> Result<(), StoreError> {
        let mut df = DataFrame::new(vec![
            Series::new("id".into(), posts.iter().map(|p| p.id).collect::<Vec<i64>>()).into(),
            Series::new(
                "user_id".into(),
                posts.iter().map(|p| p.user_id).collect::<Vec<i64>>(),
            )
            .into(),
            Series::new(
                "title".into(),
                posts.iter().map(|p| p.title.clone()).collect::<Vec<String>>(),
            )
            .into(),
            Series::new(
                "created_at".into(),
                posts.iter().map(|p| p.created_at).collect::<Vec<i64>>(),
            )
            .into(),
        ])?;
        let mut file = fs::File::create(self.posts_path())?;
        ParquetWriter::new(&mut file).finish(&mut df)?;
        Ok(())
    }

    /// Validate and persist a candidate user. Usernames are checked against
    /// the full existing population.
    pub fn create_user(&self, candidate: NewUser) -> Result<User, StoreError> {
        let users = self.read_users()?;
        let taken: Vec<String> = users.iter().map(|u| u.username.clone()).collect();
        let errors = validate_user(&candidate, &taken);
        if !errors.is_empty() {
            return Err(StoreError::Validation(errors));
        }
        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let user = User {
            id,
            username: candidate.username,
            password: candidate.password,
            full_name: candidate.full_name,
            phone: candidate.phone,
        };
        let mut all = users;
        all.push(user.clone());
        self.write_users(&all)?;
        debug!(target: "userposts::storage", "create_user: id={} username='{}'", user.id, user.username);
        Ok(user)
    }

    pub fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.read_users()?.into_iter().find(|u| u.id == id))
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read_users()?
            .into_iter()
            .find(|u| u.username == username))
    }

    /// All users ordered by full name, then id for a stable order.
    pub fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users = self.read_users()?;
        users.sort_by(|a, b| a.full_name.cmp(&b.full_name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    /// Destroy a user and every post it owns as one logical operation. Posts
    /// are removed before the owner row, so a failure between the two writes
    /// can never leave an orphaned post behind.
    pub fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let users = self.read_users()?;
        if !users.iter().any(|u| u.id == id) {
            return Err(StoreError::NotFound { entity: "user", id });
        }
        let remaining_posts: Vec<Post> = self
            .read_posts()?
            .into_iter()
            .filter(|p| p.user_id != id)
            .collect();
        self.write_posts(&remaining_posts)?;
        let remaining_users: Vec<User> = users.into_iter().filter(|u| u.id != id).collect();
        self.write_users(&remaining_users)?;
        debug!(target: "userposts::storage", "delete_user: id={} cascaded", id);
        Ok(())
    }

    /// Validate and persist a candidate post. The owner reference is enforced
    /// here at the write boundary and signals a persistence-level failure.
    pub fn create_post(&self, candidate: NewPost) -> Result<Post, StoreError> {
        let errors = validate_post(&candidate);
        if !errors.is_empty() {
            return Err(StoreError::Validation(errors));
        }
        let user_id = candidate.user_id.unwrap_or(0);
        if self.find_user(user_id)?.is_none() {
            return Err(StoreError::ForeignKey { user_id });
        }
        let posts = self.read_posts()?;
        let id = posts.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        let post = Post {
            id,
            user_id,
            title: candidate.title,
            created_at: Utc::now().timestamp_millis(),
        };
        let mut all = posts;
        all.push(post.clone());
        self.write_posts(&all)?;
        debug!(target: "userposts::storage", "create_post: id={} user_id={}", post.id, post.user_id);
        Ok(post)
    }

    pub fn find_post(&self, id: i64) -> Result<Option<Post>, StoreError> {
        Ok(self.read_posts()?.into_iter().find(|p| p.id == id))
    }

    /// Remove a single post, returning the removed record.
    pub fn delete_post(&self, id: i64) -> Result<Post, StoreError> {
        let posts = self.read_posts()?;
        let Some(victim) = posts.iter().find(|p| p.id == id).cloned() else {
            return Err(StoreError::NotFound { entity: "post", id });
        };
        let remaining: Vec<Post> = posts.into_iter().filter(|p| p.id != id).collect();
        self.write_posts(&remaining)?;
        debug!(target: "userposts::storage", "delete_post: id={}", id);
        Ok(victim)
    }

    /// One author's posts, newest first. Existence of the author is the
    /// caller's concern.
    pub fn posts_by_user(&self, user_id: i64) -> Result<Vec<Post>, StoreError> {
        let mut posts: Vec<Post> = self
            .read_posts()?
            .into_iter()
            .filter(|p| p.user_id == user_id)
            .collect();
        posts.sort_by(newest_first);
        Ok(posts)
    }

    /// All posts newest first, optionally truncated to the `limit` most
    /// recent.
    pub fn all_posts(&self, limit: Option<usize>) -> Result<Vec<Post>, StoreError> {
        let mut posts = self.read_posts()?;
        posts.sort_by(newest_first);
        if let Some(n) = limit {
            posts.truncate(n);
        }
        Ok(posts)
    }

    pub fn count_posts(&self) -> Result<i64, StoreError> {
        Ok(self.read_posts()?.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: i64, created_at: i64) -> Post {
        Post {
            id,
            user_id: 1,
            title: format!("post {}", id),
            created_at,
        }
    }

    #[test]
    fn newest_first_orders_by_created_at_then_id() {
        let mut posts = vec![post(1, 100), post(2, 300), post(3, 200)];
        posts.sort_by(newest_first);
        let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn newest_first_breaks_timestamp_ties_with_later_id_first() {
        let mut posts = vec![post(1, 100), post(2, 100), post(3, 100)];
        posts.sort_by(newest_first);
        let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
