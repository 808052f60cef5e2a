/// Access Token Claims
///
/// The self-contained identity assertion carried by every access token.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{User, UserRole};

/// Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AccessTokenClaims {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl AccessTokenClaims {
    /// Claims for `user` valid from now for `ttl`
    pub fn new(user: &User, ttl: Duration) -> Self {
        Self::issued_at(user, Utc::now(), ttl)
    }

    pub fn issued_at(user: &User, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    pub fn has_any_role(&self, allowed: &[UserRole]) -> bool {
        allowed.contains(&self.role)
    }
}
