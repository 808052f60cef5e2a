use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Salted one-way password hash owned 1:1 by a user.
///
/// The plaintext never reaches this type. A password change produces a new
/// `Credential` that replaces the old one.
#[derive(Clone, PartialEq, sqlx::FromRow)]
pub struct Credential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(user_id: Uuid, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            password_hash,
            created_at: Utc::now(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("password_hash", &"[redacted]")
            .field("created_at", &self.created_at)
            .finish()
    }
}
