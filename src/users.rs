/// User Service
///
/// Registration, credential checks and profile management. Everything here
/// works on plain domain types; the HTTP layer only translates.

use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{hash_password, verify_password};
use crate::domain::{Credential, ProfileChanges, User, UserRole};
use crate::error::{AppError, AuthError, DatabaseError, UserError, ValidationError};
use crate::store::{CredentialStore, Repositories, UserStore};
use crate::validators::{
    is_valid_dni, is_valid_email, is_valid_name, is_valid_password, is_valid_phone,
    normalize_email, parse_birthdate,
};

/// Registration input
#[derive(Deserialize)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub password_confirmation: String,
}

/// Partial profile edit; absent fields are left untouched
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dni: Option<String>,
    pub phone: Option<String>,
    pub birthdate: Option<String>,
}

impl ProfileUpdate {
    fn validate(self) -> Result<ProfileChanges, ValidationError> {
        let changes = ProfileChanges {
            first_name: self
                .first_name
                .map(|name| is_valid_name("first_name", &name))
                .transpose()?,
            last_name: self
                .last_name
                .map(|name| is_valid_name("last_name", &name))
                .transpose()?,
            dni: self.dni.map(|dni| is_valid_dni(&dni)).transpose()?,
            phone: self.phone.map(|phone| is_valid_phone(&phone)).transpose()?,
            birthdate: self
                .birthdate
                .map(|date| parse_birthdate(&date))
                .transpose()?,
        };

        if changes.is_empty() {
            return Err(ValidationError::NothingToUpdate);
        }
        Ok(changes)
    }
}

pub struct UserService {
    users: Arc<dyn UserStore>,
    credentials: Arc<dyn CredentialStore>,
}

/// bcrypt is deliberately slow; keep it off the async workers
async fn hash_blocking(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
}

async fn verify_blocking(password: String, password_hash: String) -> Result<(), AppError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
        .await
        .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?
}

impl UserService {
    pub fn new(repositories: &Repositories) -> Self {
        Self {
            users: repositories.users.clone(),
            credentials: repositories.credentials.clone(),
        }
    }

    /// Create a new patient account with its credential.
    ///
    /// # Errors
    /// - `ValidationError` for malformed input
    /// - `UserError::AlreadyExists` when the email is taken
    pub async fn register(&self, new_user: NewUser) -> Result<User, AppError> {
        let email = is_valid_email(&new_user.email)?;
        let first_name = is_valid_name("first_name", &new_user.first_name)?;
        let last_name = is_valid_name("last_name", &new_user.last_name)?;
        is_valid_password(&new_user.password, &new_user.password_confirmation)?;

        if self.users.get_by_email(&email).await?.is_some() {
            return Err(UserError::AlreadyExists.into());
        }

        let password_hash = hash_blocking(new_user.password).await?;
        let user = User::new_patient(email, first_name, last_name);
        let credential = Credential::new(user.id, password_hash);

        // a concurrent registration can still win the race to the unique index
        match self.users.save(&user, &credential).await {
            Ok(()) => {}
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_))) => {
                return Err(UserError::AlreadyExists.into());
            }
            Err(e) => return Err(e),
        }

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Check an email/password pair.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = normalize_email(email);

        let user = match self.users.get_by_email(&email).await? {
            Some(user) => user,
            None => {
                tracing::debug!("Login for unknown email");
                return Err(AuthError::IncorrectCredentials.into());
            }
        };

        let credential = self
            .credentials
            .get_by_user_id(user.id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!("User {} has no credential", user.id))
            })?;

        verify_blocking(password.to_string(), credential.password_hash).await?;

        if !user.is_active {
            return Err(AuthError::AccountInactive.into());
        }

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(user)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<User, AppError> {
        self.users
            .get_by_id(id)
            .await?
            .ok_or_else(|| UserError::NotFound.into())
    }

    /// # Errors
    /// `UserError::InvalidRole` for anything outside the closed role set,
    /// checked before the store is touched.
    pub async fn update_role(&self, id: Uuid, role: &str) -> Result<User, AppError> {
        let role = role.trim().parse::<UserRole>()?;

        let mut user = self.get_by_id(id).await?;
        user.set_role(role);
        self.users.update(&user).await?;

        tracing::info!(user_id = %id, role = %role, "User role updated");
        Ok(user)
    }

    pub async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<User, AppError> {
        let changes = update.validate()?;

        let mut user = self.get_by_id(id).await?;
        user.apply(changes);
        self.users.update(&user).await?;

        tracing::info!(user_id = %id, "User profile updated");
        Ok(user)
    }

    /// Replace the user's credential after checking the current password
    pub async fn change_password(
        &self,
        id: Uuid,
        current_password: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), AppError> {
        is_valid_password(new_password, confirmation)?;

        let credential = self
            .credentials
            .get_by_user_id(id)
            .await?
            .ok_or(UserError::NotFound)?;

        verify_blocking(current_password.to_string(), credential.password_hash).await?;

        let password_hash = hash_blocking(new_password.to_string()).await?;
        self.credentials
            .replace(&Credential::new(id, password_hash))
            .await?;

        tracing::info!(user_id = %id, "Password changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn alice() -> NewUser {
        NewUser {
            email: "Alice@Example.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            password: "s3cret1".to_string(),
            password_confirmation: "s3cret1".to_string(),
        }
    }

    fn service() -> (UserService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let service = UserService::new(&Repositories::from_shared(store.clone()));
        (service, store)
    }

    #[tokio::test]
    async fn test_register_persists_user_and_credential() {
        let (service, store) = service();

        let user = service.register(alice()).await.expect("register");

        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, UserRole::Patient);
        let credential = CredentialStore::get_by_user_id(store.as_ref(), user.id)
            .await
            .unwrap()
            .expect("credential saved");
        assert!(verify_password("s3cret1", &credential.password_hash).is_ok());
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let (service, _) = service();
        service.register(alice()).await.unwrap();

        let mut again = alice();
        again.email = "alice@example.com".to_string();
        let result = service.register(again).await;

        assert!(matches!(result, Err(AppError::User(UserError::AlreadyExists))));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (service, _) = service();

        let mut short_name = alice();
        short_name.first_name = "Al".to_string();
        assert!(matches!(
            service.register(short_name).await,
            Err(AppError::Validation(ValidationError::TooShort("first_name", 3)))
        ));

        let mut mismatch = alice();
        mismatch.password_confirmation = "different".to_string();
        assert!(matches!(
            service.register(mismatch).await,
            Err(AppError::Validation(ValidationError::Mismatch(_, _)))
        ));

        let mut bad_email = alice();
        bad_email.email = "not-an-email".to_string();
        assert!(matches!(
            service.register(bad_email).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_login_outcomes() {
        let (service, store) = service();
        let user = service.register(alice()).await.unwrap();

        let logged_in = service.login(" ALICE@example.com ", "s3cret1").await.unwrap();
        assert_eq!(logged_in.id, user.id);

        assert!(matches!(
            service.login("alice@example.com", "wrong-password").await,
            Err(AppError::Auth(AuthError::IncorrectCredentials))
        ));
        assert!(matches!(
            service.login("bob@example.com", "s3cret1").await,
            Err(AppError::Auth(AuthError::IncorrectCredentials))
        ));

        let mut inactive = user.clone();
        inactive.is_active = false;
        store.update(&inactive).await.unwrap();
        assert!(matches!(
            service.login("alice@example.com", "s3cret1").await,
            Err(AppError::Auth(AuthError::AccountInactive))
        ));
    }

    #[tokio::test]
    async fn test_update_role() {
        let (service, _) = service();
        let user = service.register(alice()).await.unwrap();

        let updated = service.update_role(user.id, "doctor").await.unwrap();
        assert_eq!(updated.role, UserRole::Doctor);
        assert_eq!(service.get_by_id(user.id).await.unwrap().role, UserRole::Doctor);

        assert!(matches!(
            service.update_role(user.id, "janitor").await,
            Err(AppError::User(UserError::InvalidRole(_)))
        ));
        assert!(matches!(
            service.update_role(Uuid::new_v4(), "admin").await,
            Err(AppError::User(UserError::NotFound))
        ));
    }

    #[tokio::test]
    async fn test_update_profile() {
        let (service, _) = service();
        let user = service.register(alice()).await.unwrap();

        let updated = service
            .update_profile(
                user.id,
                ProfileUpdate {
                    phone: Some("+52 951 123 4567".to_string()),
                    birthdate: Some("1990-05-04".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.first_name, "Alice");
        assert_eq!(updated.phone.as_deref(), Some("+52 951 123 4567"));
        assert_eq!(updated.birthdate.unwrap().to_string(), "1990-05-04");

        assert!(matches!(
            service.update_profile(user.id, ProfileUpdate::default()).await,
            Err(AppError::Validation(ValidationError::NothingToUpdate))
        ));
        assert!(matches!(
            service
                .update_profile(
                    user.id,
                    ProfileUpdate {
                        birthdate: Some("04/05/1990".to_string()),
                        ..Default::default()
                    }
                )
                .await,
            Err(AppError::Validation(ValidationError::InvalidFormat("birthdate")))
        ));
    }

    #[tokio::test]
    async fn test_change_password() {
        let (service, _) = service();
        let user = service.register(alice()).await.unwrap();

        assert!(matches!(
            service
                .change_password(user.id, "wrong-password", "n3wpass", "n3wpass")
                .await,
            Err(AppError::Auth(AuthError::IncorrectCredentials))
        ));

        service
            .change_password(user.id, "s3cret1", "n3wpass", "n3wpass")
            .await
            .unwrap();

        assert!(service.login("alice@example.com", "s3cret1").await.is_err());
        assert!(service.login("alice@example.com", "n3wpass").await.is_ok());
    }
}
