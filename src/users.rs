//! User storage behind an explicit repository interface.
//!
//! The authentication handlers depend on [`UserRepository`] rather than any
//! concrete store, so the in-memory implementation can be swapped for a
//! transactional one without touching them. Inserts take the write lock for
//! the duplicate check and the write together, so concurrent signups for
//! the same username cannot both succeed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// A registered user. Created at signup, read at login.
#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

/// Insert failed because the username is already taken.
#[derive(Debug, Error)]
#[error("User already exists")]
pub struct DuplicateUser;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Option<User>;
    async fn insert(&self, user: User) -> Result<(), DuplicateUser>;
}

/// In-memory repository; the process lifetime is the store lifetime.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_username(&self, username: &str) -> Option<User> {
        let users = self.users.read().unwrap();
        users.get(username).cloned()
    }

    async fn insert(&self, user: User) -> Result<(), DuplicateUser> {
        let mut users = self.users.write().unwrap();
        if users.contains_key(&user.username) {
            return Err(DuplicateUser);
        }
        users.insert(user.username.clone(), user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, role: &str) -> User {
        User {
            username: name.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            role: role.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_then_find() {
        let repo = MemoryUserRepository::new();
        repo.insert(user("alice", "Finance")).await.unwrap();

        let found = repo.find_by_username("alice").await.unwrap();
        assert_eq!(found.role, "Finance");
    }

    #[tokio::test]
    async fn find_missing_returns_none() {
        let repo = MemoryUserRepository::new();
        assert!(repo.find_by_username("nobody").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_username_rejected() {
        let repo = MemoryUserRepository::new();
        repo.insert(user("alice", "Finance")).await.unwrap();

        let err = repo.insert(user("alice", "Marketing")).await.unwrap_err();
        assert_eq!(err.to_string(), "User already exists");

        // First registration wins
        let found = repo.find_by_username("alice").await.unwrap();
        assert_eq!(found.role, "Finance");
    }
}
