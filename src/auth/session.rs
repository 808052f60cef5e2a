/// Session Service
///
/// Owns the lifecycle of a user's session: an access token signed by the
/// codec plus exactly one stored refresh token. Issuing always rotates, so
/// a user never holds more than one live refresh token.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::claims::AccessTokenClaims;
use crate::auth::jwt::AccessTokenCodec;
use crate::auth::refresh_token::generate_refresh_token;
use crate::configuration::JwtSettings;
use crate::domain::{RefreshToken, User};
use crate::error::{AppError, AuthError, ConfigError, DatabaseError};
use crate::store::RefreshTokenStore;

const LOCK_STRIPES: usize = 64;

/// Tokens handed back to the caller after issuance or renewal
#[derive(Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct SessionService {
    codec: Arc<AccessTokenCodec>,
    store: Arc<dyn RefreshTokenStore>,
    refresh_ttl: Duration,
    // delete-then-insert for one user must not interleave with another issue
    locks: Vec<Mutex<()>>,
}

impl SessionService {
    pub fn new(
        codec: Arc<AccessTokenCodec>,
        store: Arc<dyn RefreshTokenStore>,
        refresh_ttl: Duration,
    ) -> Result<Self, AppError> {
        if refresh_ttl <= Duration::zero() {
            return Err(ConfigError::InvalidValue(
                "jwt.refresh_token_ttl_hours must be positive".to_string(),
            )
            .into());
        }

        Ok(Self {
            codec,
            store,
            refresh_ttl,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    pub fn from_settings(
        settings: &JwtSettings,
        store: Arc<dyn RefreshTokenStore>,
    ) -> Result<Self, AppError> {
        let codec = AccessTokenCodec::from_settings(settings)?;
        Self::new(Arc::new(codec), store, settings.refresh_token_ttl())
    }

    pub fn codec(&self) -> Arc<AccessTokenCodec> {
        self.codec.clone()
    }

    pub fn access_token_ttl(&self) -> Duration {
        self.codec.ttl()
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn lock_for(&self, user_id: Uuid) -> &Mutex<()> {
        &self.locks[(user_id.as_u128() % LOCK_STRIPES as u128) as usize]
    }

    /// Sign an access token and replace the user's refresh token.
    ///
    /// # Errors
    /// Any store failure aborts issuance; no new refresh token is left behind.
    pub async fn issue_tokens(&self, user: &User) -> Result<TokenPair, AppError> {
        self.rotate(user, None).await
    }

    /// Same rotation as `issue_tokens`, for a caller that already proved
    /// possession of a valid refresh token.
    pub async fn renew_tokens(&self, user: &User) -> Result<TokenPair, AppError> {
        self.issue_tokens(user).await
    }

    /// Rotate only if `presented` is still the user's live refresh token.
    ///
    /// # Errors
    /// `AuthError::InvalidToken` when the token was superseded or deleted
    /// after it was validated.
    pub async fn renew_presented(
        &self,
        presented: &RefreshToken,
        user: &User,
    ) -> Result<TokenPair, AppError> {
        self.rotate(user, Some(presented)).await
    }

    async fn rotate(
        &self,
        user: &User,
        expected: Option<&RefreshToken>,
    ) -> Result<TokenPair, AppError> {
        let access_token = self.codec.sign(user)?;
        let record = RefreshToken::new(generate_refresh_token(), user.id, self.refresh_ttl);

        let _guard = self.lock_for(user.id).lock().await;

        let existing = self.store.get_by_user_id(user.id).await?;

        if let Some(expected) = expected {
            let still_live = matches!(
                &existing,
                Some(current) if current.id == expected.id && current.token == expected.token
            );
            if !still_live {
                tracing::debug!(user_id = %user.id, "Presented refresh token no longer live");
                return Err(AuthError::InvalidToken.into());
            }
        }

        if let Some(existing) = existing {
            self.store.delete(existing.id).await?;
            tracing::debug!(user_id = %user.id, "Previous refresh token rotated out");
        }

        match self.store.save(&record).await {
            Ok(()) => {}
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(detail))) => {
                tracing::error!(user_id = %user.id, detail = %detail, "Refresh token insert conflicted");
                return Err(AppError::Internal("Refresh token could not be stored".to_string()));
            }
            Err(e) => return Err(e),
        }

        tracing::info!(user_id = %user.id, "Session tokens issued");

        Ok(TokenPair {
            access_token,
            refresh_token: record.token,
        })
    }

    /// Look up a presented refresh token without consuming it.
    ///
    /// # Errors
    /// `AuthError::InvalidToken` when the value is unknown, expired, does not
    /// match the stored row or has no owner. Store failures pass through.
    pub async fn validate_refresh_token(&self, value: &str) -> Result<RefreshToken, AppError> {
        if value.is_empty() {
            return Err(AuthError::InvalidToken.into());
        }

        let record = match self.store.get_by_token(value).await? {
            Some(record) => record,
            None => {
                tracing::debug!("Refresh token not found");
                return Err(AuthError::InvalidToken.into());
            }
        };

        if record.token != value {
            tracing::warn!(token_id = %record.id, "Stored refresh token does not match lookup");
            return Err(AuthError::InvalidToken.into());
        }
        if record.user_id.is_nil() {
            tracing::warn!(token_id = %record.id, "Refresh token has no owner");
            return Err(AuthError::InvalidToken.into());
        }
        if record.is_expired_at(Utc::now()) {
            tracing::debug!(user_id = %record.user_id, "Refresh token expired");
            return Err(AuthError::InvalidToken.into());
        }

        Ok(record)
    }

    /// Remove the user's refresh token; succeeds when there is none.
    pub async fn delete_session_for_user(&self, user_id: Uuid) -> Result<(), AppError> {
        let _guard = self.lock_for(user_id).lock().await;

        match self.store.get_by_user_id(user_id).await? {
            Some(existing) => {
                self.store.delete(existing.id).await?;
                tracing::info!(user_id = %user_id, "Session deleted");
            }
            None => tracing::debug!(user_id = %user_id, "No session to delete"),
        }
        Ok(())
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims, AppError> {
        self.codec.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;

    const TEST_SECRET: &str = "session-test-secret-with-enough-bytes";

    fn user() -> User {
        User::new_patient(
            "alice@example.com".to_string(),
            "Alice".to_string(),
            "Liddell".to_string(),
        )
    }

    fn service_with(store: Arc<dyn RefreshTokenStore>) -> SessionService {
        let codec = AccessTokenCodec::new(TEST_SECRET, Duration::minutes(15)).expect("codec");
        SessionService::new(Arc::new(codec), store, Duration::hours(24)).expect("service")
    }

    fn is_invalid_token<T>(result: &Result<T, AppError>) -> bool {
        matches!(result, Err(AppError::Auth(AuthError::InvalidToken)))
    }

    /// Returns one fixed row for every lookup.
    struct FixedStore {
        record: RefreshToken,
    }

    #[async_trait]
    impl RefreshTokenStore for FixedStore {
        async fn save(&self, _token: &RefreshToken) -> Result<(), AppError> {
            Ok(())
        }

        async fn delete(&self, _token_id: Uuid) -> Result<(), AppError> {
            Ok(())
        }

        async fn get_by_user_id(&self, _user_id: Uuid) -> Result<Option<RefreshToken>, AppError> {
            Ok(Some(self.record.clone()))
        }

        async fn get_by_token(&self, _token: &str) -> Result<Option<RefreshToken>, AppError> {
            Ok(Some(self.record.clone()))
        }
    }

    /// Accepts reads, fails every write.
    struct BrokenStore;

    #[async_trait]
    impl RefreshTokenStore for BrokenStore {
        async fn save(&self, _token: &RefreshToken) -> Result<(), AppError> {
            Err(DatabaseError::ConnectionPool("pool timed out".to_string()).into())
        }

        async fn delete(&self, _token_id: Uuid) -> Result<(), AppError> {
            Err(DatabaseError::ConnectionPool("pool timed out".to_string()).into())
        }

        async fn get_by_user_id(&self, _user_id: Uuid) -> Result<Option<RefreshToken>, AppError> {
            Ok(None)
        }

        async fn get_by_token(&self, _token: &str) -> Result<Option<RefreshToken>, AppError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_repeated_issue_keeps_one_token() {
        let store = Arc::new(InMemoryStore::new());
        let service = service_with(store.clone());
        let user = user();

        let mut last = None;
        for _ in 0..5 {
            last = Some(service.issue_tokens(&user).await.expect("issue"));
        }
        let last = last.unwrap();

        let rows = store.refresh_tokens_for(user.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].token, last.refresh_token);
        assert!(!last.access_token.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_issue_keeps_one_token() {
        let store = Arc::new(InMemoryStore::new());
        let service = Arc::new(service_with(store.clone()));
        let user = user();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = service.clone();
                let user = user.clone();
                tokio::spawn(async move { service.issue_tokens(&user).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().expect("issue");
        }

        assert_eq!(store.refresh_tokens_for(user.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rotated_out_token_is_invalid() {
        let store = Arc::new(InMemoryStore::new());
        let service = service_with(store);
        let user = user();

        let first = service.issue_tokens(&user).await.unwrap();
        let record = service
            .validate_refresh_token(&first.refresh_token)
            .await
            .expect("first token is valid");
        assert_eq!(record.user_id, user.id);

        let second = service.renew_tokens(&user).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        assert!(is_invalid_token(
            &service.validate_refresh_token(&first.refresh_token).await
        ));
        assert!(service
            .validate_refresh_token(&second.refresh_token)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_validation_is_not_destructive() {
        let store = Arc::new(InMemoryStore::new());
        let service = service_with(store.clone());
        let user = user();

        let pair = service.issue_tokens(&user).await.unwrap();
        for _ in 0..3 {
            service.validate_refresh_token(&pair.refresh_token).await.unwrap();
        }

        assert_eq!(store.refresh_tokens_for(user.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_token_is_invalid() {
        let store = Arc::new(InMemoryStore::new());
        let service = service_with(store.clone());
        let expired = RefreshToken::new("stale".to_string(), Uuid::new_v4(), Duration::hours(-1));
        RefreshTokenStore::save(store.as_ref(), &expired).await.unwrap();

        let result = service.validate_refresh_token("stale").await;

        assert!(is_invalid_token(&result));
        // still there: expiry is reported, not swept
        assert_eq!(store.refresh_tokens_for(expired.user_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_and_empty_values_are_invalid() {
        let service = service_with(Arc::new(InMemoryStore::new()));

        assert!(is_invalid_token(&service.validate_refresh_token("nope").await));
        assert!(is_invalid_token(&service.validate_refresh_token("").await));
    }

    #[tokio::test]
    async fn test_mismatched_row_is_invalid() {
        let record = RefreshToken::new("stored-value".to_string(), Uuid::new_v4(), Duration::hours(1));
        let service = service_with(Arc::new(FixedStore { record }));

        let result = service.validate_refresh_token("presented-value").await;
        assert!(is_invalid_token(&result));
    }

    #[tokio::test]
    async fn test_ownerless_row_is_invalid() {
        let record = RefreshToken::new("value".to_string(), Uuid::nil(), Duration::hours(1));
        let service = service_with(Arc::new(FixedStore { record }));

        let result = service.validate_refresh_token("value").await;
        assert!(is_invalid_token(&result));
    }

    #[tokio::test]
    async fn test_store_failure_aborts_issue() {
        let service = service_with(Arc::new(BrokenStore));

        let result = service.issue_tokens(&user()).await;
        assert!(matches!(
            result,
            Err(AppError::Database(DatabaseError::ConnectionPool(_)))
        ));
    }

    /// Another writer already holds the owner's row.
    struct ConflictStore;

    #[async_trait]
    impl RefreshTokenStore for ConflictStore {
        async fn save(&self, _token: &RefreshToken) -> Result<(), AppError> {
            Err(DatabaseError::UniqueConstraintViolation("refresh_tokens_user_id_key".to_string()).into())
        }

        async fn delete(&self, _token_id: Uuid) -> Result<(), AppError> {
            Ok(())
        }

        async fn get_by_user_id(&self, _user_id: Uuid) -> Result<Option<RefreshToken>, AppError> {
            Ok(None)
        }

        async fn get_by_token(&self, _token: &str) -> Result<Option<RefreshToken>, AppError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_save_conflict_is_internal_not_conflict() {
        let service = service_with(Arc::new(ConflictStore));

        let err = match service.issue_tokens(&user()).await {
            Err(e) => e,
            Ok(_) => panic!("issue should fail"),
        };

        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(err.status(), actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_services_sharing_a_store_keep_one_token() {
        // two processes: separate lock sets, one table
        let store = Arc::new(InMemoryStore::new());
        let first = Arc::new(service_with(store.clone()));
        let second = Arc::new(service_with(store.clone()));
        let user = user();

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let service = if i % 2 == 0 { first.clone() } else { second.clone() };
                let user = user.clone();
                tokio::spawn(async move { service.issue_tokens(&user).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().expect("issue");
        }

        assert_eq!(store.refresh_tokens_for(user.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_renew_presented_rotates_live_token() {
        let store = Arc::new(InMemoryStore::new());
        let service = service_with(store.clone());
        let user = user();

        let first = service.issue_tokens(&user).await.unwrap();
        let record = service.validate_refresh_token(&first.refresh_token).await.unwrap();

        let second = service.renew_presented(&record, &user).await.expect("renew");

        let rows = store.refresh_tokens_for(user.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].token, second.refresh_token);

        // the same presented token cannot be replayed
        assert!(is_invalid_token(&service.renew_presented(&record, &user).await));
    }

    #[tokio::test]
    async fn test_renew_after_logout_does_not_revive_session() {
        let store = Arc::new(InMemoryStore::new());
        let service = service_with(store.clone());
        let user = user();

        let pair = service.issue_tokens(&user).await.unwrap();
        let record = service.validate_refresh_token(&pair.refresh_token).await.unwrap();

        // logout lands between validation and renewal
        service.delete_session_for_user(user.id).await.unwrap();

        let result = service.renew_presented(&record, &user).await;

        assert!(is_invalid_token(&result));
        assert!(store.refresh_tokens_for(user.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_session() {
        let store = Arc::new(InMemoryStore::new());
        let service = service_with(store.clone());
        let user = user();

        // no session yet
        service.delete_session_for_user(user.id).await.unwrap();

        let pair = service.issue_tokens(&user).await.unwrap();
        service.delete_session_for_user(user.id).await.unwrap();

        assert!(store.refresh_tokens_for(user.id).unwrap().is_empty());
        assert!(is_invalid_token(
            &service.validate_refresh_token(&pair.refresh_token).await
        ));
    }

    #[tokio::test]
    async fn test_access_token_round_trip() {
        let service = service_with(Arc::new(InMemoryStore::new()));
        let user = user();

        let pair = service.issue_tokens(&user).await.unwrap();
        let claims = service.verify_access_token(&pair.access_token).unwrap();

        assert_eq!(claims.user_id, user.id);
        assert_eq!(service.access_token_ttl(), Duration::minutes(15));
        assert_eq!(service.refresh_token_ttl(), Duration::hours(24));
    }

    #[test]
    fn test_non_positive_refresh_ttl_is_rejected() {
        let codec = AccessTokenCodec::new(TEST_SECRET, Duration::minutes(15)).unwrap();
        let result = SessionService::new(
            Arc::new(codec),
            Arc::new(InMemoryStore::new()),
            Duration::zero(),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
