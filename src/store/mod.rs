//! Persistence contracts consumed by the services.
//!
//! The services only see these traits; `InMemoryStore` backs the tests and
//! `PgStore` backs the running server. "No row" is always `Ok(None)`, never
//! an error.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Credential, RefreshToken, User};
use crate::error::AppError;

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Persist a new user together with its credential; both or neither.
    async fn save(&self, user: &User, credential: &Credential) -> Result<(), AppError>;

    async fn update(&self, user: &User) -> Result<(), AppError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_by_user_id(&self, user_id: Uuid) -> Result<Option<Credential>, AppError>;

    /// Insert or overwrite the credential owned by `credential.user_id`
    async fn replace(&self, credential: &Credential) -> Result<(), AppError>;
}

/// Refresh tokens keyed by id, owner and value.
///
/// `save` replaces any token the owner already holds, so an owner never
/// has more than one row.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn save(&self, token: &RefreshToken) -> Result<(), AppError>;

    async fn delete(&self, token_id: Uuid) -> Result<(), AppError>;

    async fn get_by_user_id(&self, user_id: Uuid) -> Result<Option<RefreshToken>, AppError>;

    async fn get_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError>;
}

/// The three stores wired into the services
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
}

impl Repositories {
    /// Use one backend for all three stores
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: UserStore + CredentialStore + RefreshTokenStore + 'static,
    {
        Self {
            users: store.clone(),
            credentials: store.clone(),
            refresh_tokens: store,
        }
    }
}
