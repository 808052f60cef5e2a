/// Password Hashing and Verification
///
/// bcrypt at its default cost. Strength rules live in `validators`; this
/// module only hashes and compares.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, AuthError};

/// Hash a password using bcrypt with a fresh random salt
///
/// # Errors
/// Only fails when the RNG or the bcrypt implementation itself fails, which
/// is reported as an internal error, never as a problem with the input.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its stored hash
///
/// # Errors
/// - `AuthError::IncorrectCredentials` when the password does not match
/// - `AppError::Internal` when the stored hash cannot be parsed
pub fn verify_password(password: &str, password_hash: &str) -> Result<(), AppError> {
    match verify(password, password_hash) {
        Ok(true) => Ok(()),
        Ok(false) => Err(AuthError::IncorrectCredentials.into()),
        Err(e) => Err(AppError::Internal(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let password = "s3cret1";
        let hash = hash_password(password).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_same_password_gets_different_salts() {
        let first = hash_password("s3cret1").expect("Failed to hash password");
        let second = hash_password("s3cret1").expect("Failed to hash password");

        assert_ne!(first, second);
        assert!(verify_password("s3cret1", &first).is_ok());
        assert!(verify_password("s3cret1", &second).is_ok());
    }

    #[test]
    fn test_verify_wrong_password() {
        let hash = hash_password("s3cret1").expect("Failed to hash password");

        let result = verify_password("s3cret2", &hash);
        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::IncorrectCredentials))
        ));
    }

    #[test]
    fn test_malformed_hash_is_not_a_credential_error() {
        let result = verify_password("s3cret1", "not-a-bcrypt-hash");
        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
