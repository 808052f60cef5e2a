use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Credential, RefreshToken, User, UserRole};
use crate::error::{AppError, DatabaseError};
use crate::store::{CredentialStore, RefreshTokenStore, UserStore};

/// Postgres-backed store; see `migrations/` for the schema
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
    dni: Option<String>,
    phone: Option<String>,
    birthdate: Option<NaiveDate>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<UserRole>().map_err(|_| {
            AppError::Database(DatabaseError::UnexpectedError(format!(
                "unknown role {:?} stored for user {}",
                row.role, row.id
            )))
        })?;

        Ok(User {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            role,
            dni: row.dni,
            phone: row.phone,
            birthdate: row.birthdate,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const USER_COLUMNS: &str = "id, email, first_name, last_name, role, dni, phone, birthdate, \
                            is_active, created_at, updated_at";

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations from `./migrations`
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::QueryExecution(e.to_string())))
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn save(&self, user: &User, credential: &Credential) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, first_name, last_name, role, dni, phone, birthdate,
                               is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(&user.dni)
        .bind(&user.phone)
        .bind(user.birthdate)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO user_credentials (id, user_id, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(credential.id)
        .bind(credential.user_id)
        .bind(&credential.password_hash)
        .bind(credential.created_at)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, role = $4, dni = $5, phone = $6,
                birthdate = $7, is_active = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(&user.dni)
        .bind(&user.phone)
        .bind(user.birthdate)
        .bind(user.is_active)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user {}", user.id)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn get_by_user_id(&self, user_id: Uuid) -> Result<Option<Credential>, AppError> {
        let credential = sqlx::query_as::<_, Credential>(
            "SELECT id, user_id, password_hash, created_at FROM user_credentials WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credential)
    }

    async fn replace(&self, credential: &Credential) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO user_credentials (id, user_id, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET id = EXCLUDED.id,
                password_hash = EXCLUDED.password_hash,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(credential.id)
        .bind(credential.user_id)
        .bind(&credential.password_hash)
        .bind(credential.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn save(&self, token: &RefreshToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, token, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                id = EXCLUDED.id,
                token = EXCLUDED.token,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(token.id)
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, token_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
            .bind(token_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_by_user_id(&self, user_id: Uuid) -> Result<Option<RefreshToken>, AppError> {
        let token = sqlx::query_as::<_, RefreshToken>(
            "SELECT id, token, user_id, created_at, expires_at FROM refresh_tokens WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        let token = sqlx::query_as::<_, RefreshToken>(
            "SELECT id, token, user_id, created_at, expires_at FROM refresh_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }
}
