use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Credential, RefreshToken, User};
use crate::error::{AppError, DatabaseError};
use crate::store::{CredentialStore, RefreshTokenStore, UserStore};

/// Process-local store with the same uniqueness rules as the Postgres schema
#[derive(Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    // keyed by owning user
    credentials: RwLock<HashMap<Uuid, Credential>>,
    refresh_tokens: RwLock<HashMap<Uuid, RefreshToken>>,
}

fn poisoned<T>(_: PoisonError<T>) -> AppError {
    AppError::Database(DatabaseError::UnexpectedError(
        "in-memory store lock poisoned".to_string(),
    ))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every refresh token row owned by `user_id`
    pub fn refresh_tokens_for(&self, user_id: Uuid) -> Result<Vec<RefreshToken>, AppError> {
        let tokens = self.refresh_tokens.read().map_err(poisoned)?;
        Ok(tokens
            .values()
            .filter(|token| token.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn save(&self, user: &User, credential: &Credential) -> Result<(), AppError> {
        let mut users = self.users.write().map_err(poisoned)?;
        let mut credentials = self.credentials.write().map_err(poisoned)?;

        if users.contains_key(&user.id) {
            return Err(DatabaseError::UniqueConstraintViolation("users_pkey".to_string()).into());
        }
        if users.values().any(|existing| existing.email == user.email) {
            return Err(
                DatabaseError::UniqueConstraintViolation("users_email_key".to_string()).into(),
            );
        }

        users.insert(user.id, user.clone());
        credentials.insert(credential.user_id, credential.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<(), AppError> {
        let mut users = self.users.write().map_err(poisoned)?;
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(DatabaseError::NotFound(format!("user {}", user.id)).into()),
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn get_by_user_id(&self, user_id: Uuid) -> Result<Option<Credential>, AppError> {
        let credentials = self.credentials.read().map_err(poisoned)?;
        Ok(credentials.get(&user_id).cloned())
    }

    async fn replace(&self, credential: &Credential) -> Result<(), AppError> {
        let mut credentials = self.credentials.write().map_err(poisoned)?;
        credentials.insert(credential.user_id, credential.clone());
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryStore {
    async fn save(&self, token: &RefreshToken) -> Result<(), AppError> {
        let mut tokens = self.refresh_tokens.write().map_err(poisoned)?;
        tokens.retain(|_, existing| existing.user_id != token.user_id);
        tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn delete(&self, token_id: Uuid) -> Result<(), AppError> {
        let mut tokens = self.refresh_tokens.write().map_err(poisoned)?;
        tokens.remove(&token_id);
        Ok(())
    }

    async fn get_by_user_id(&self, user_id: Uuid) -> Result<Option<RefreshToken>, AppError> {
        let tokens = self.refresh_tokens.read().map_err(poisoned)?;
        Ok(tokens.values().find(|token| token.user_id == user_id).cloned())
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        let tokens = self.refresh_tokens.read().map_err(poisoned)?;
        Ok(tokens.values().find(|stored| stored.token == token).cloned())
    }
}
