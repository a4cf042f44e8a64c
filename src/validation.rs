//! Field-level validation rules shared by the user and post stores.
//!
//! Every check runs independently and failures are collected into a
//! [`ValidationErrors`] set, so a caller can re-render its input with
//! per-field messages instead of seeing only the first problem.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::storage::{NewPost, NewUser};

// username: letters or digits, length 3 to 12
static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{3,12}$").unwrap());
// full_name: starts with a letter, then letters, space, underscore or hyphen,
// total length 5 to 30
static FULL_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][ A-Za-z_-]{4,29}$").unwrap());
// phone: digits only, length 7 to 20
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{7,20}$").unwrap());

pub const TITLE_MAX_CHARS: usize = 140;

/// The set of failing fields for a candidate record, keyed by field name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn into_fields(self) -> BTreeMap<String, Vec<String>> {
        self.errors
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|(field, messages)| format!("{} {}", field, messages.join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Decide whether a candidate user is acceptable for persistence.
/// Uniqueness is checked against the full existing population, case-sensitive,
/// independently of the format check.
pub fn validate_user(candidate: &NewUser, taken_usernames: &[String]) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    if !USERNAME_RE.is_match(&candidate.username) {
        errors.add("username", "is invalid");
    }
    if taken_usernames.iter().any(|u| u == &candidate.username) {
        errors.add("username", "has already been taken");
    }
    if candidate.password.is_empty() {
        errors.add("password", "can't be blank");
    }
    if !FULL_NAME_RE.is_match(&candidate.full_name) {
        errors.add("full_name", "is invalid");
    }
    if !PHONE_RE.is_match(&candidate.phone) {
        errors.add("phone", "has to have 7 to 20 digits");
    }
    errors
}

/// Decide whether a candidate post is acceptable for persistence.
/// Referential integrity of `user_id` is the storage layer's concern, not a
/// validation rule.
pub fn validate_post(candidate: &NewPost) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    if candidate.user_id.is_none() {
        errors.add("user_id", "can't be blank");
    }
    if candidate.title.is_empty() {
        errors.add("title", "can't be blank");
    } else if candidate.title.chars().count() > TITLE_MAX_CHARS {
        errors.add("title", "is too long (maximum is 140 characters)");
    }
    errors
}
