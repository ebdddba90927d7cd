// Copyright 2023 Remi Bernotavicius

use crate::database::models::{User, UserId};
use crate::error::{Error, Result};
use sha2::{Digest as _, Sha256};

const HASH_SCHEME: &str = "sha256";

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Produces a `sha256$<salt>$<digest>` string with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt = hex::encode(rand::random::<[u8; 16]>());
    format!("{HASH_SCHEME}${salt}${}", digest(&salt, password))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(HASH_SCHEME), Some(salt), Some(expected)) => digest(salt, password) == expected,
        _ => false,
    }
}

/// 40 hex characters, the same shape as the tokens clients already know how to send.
pub fn generate_token() -> String {
    hex::encode(rand::random::<[u8; 20]>())
}

/// Who is making a request. Every operation takes this explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Requester {
    #[default]
    Anonymous,
    User(User),
}

impl Requester {
    pub fn user(&self) -> Result<&User> {
        match self {
            Self::User(user) => Ok(user),
            Self::Anonymous => Err(Error::AuthenticationRequired),
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User(user) => Some(user.id),
            Self::Anonymous => None,
        }
    }
}

#[test]
fn password_round_trip() {
    let stored = hash_password("correct horse");
    assert!(stored.starts_with("sha256$"));
    assert!(verify_password("correct horse", &stored));
    assert!(!verify_password("wrong horse", &stored));
    assert!(!verify_password("correct horse", "plain"));
}

#[test]
fn password_hashes_are_salted() {
    assert_ne!(hash_password("same"), hash_password("same"));
}

#[test]
fn token_shape() {
    let token = generate_token();
    assert_eq!(token.len(), 40);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(token, generate_token());
}

#[test]
fn anonymous_requester_is_not_authenticated() {
    let requester = Requester::Anonymous;
    assert!(matches!(requester.user(), Err(Error::AuthenticationRequired)));
    assert_eq!(requester.user_id(), None);
}
