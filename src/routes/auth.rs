/// Authentication Routes
///
/// Registration, login, token renewal and logout. Every successful response
/// carries a fresh token pair and sets the refresh token cookie.

use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder};
use serde::{Deserialize, Serialize};

use crate::auth::{AccessTokenClaims, SessionService, TokenPair};
use crate::domain::User;
use crate::error::{AppError, AuthError, UserError};
use crate::users::{NewUser, UserService};

pub const REFRESH_COOKIE: &str = "refresh_token";
const REFRESH_COOKIE_PATH: &str = "/api/v0/users/auth";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RenewRequest {
    pub refresh_token: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub user: User,
}

fn refresh_cookie(value: String, session: &SessionService) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, value)
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(time::Duration::seconds(
            session.refresh_token_ttl().num_seconds(),
        ))
        .finish()
}

pub(crate) fn expired_refresh_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(REFRESH_COOKIE, "")
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .finish();
    cookie.make_removal();
    cookie
}

fn session_response(
    mut builder: HttpResponseBuilder,
    tokens: TokenPair,
    user: User,
    session: &SessionService,
) -> HttpResponse {
    builder
        .cookie(refresh_cookie(tokens.refresh_token.clone(), session))
        .json(AuthResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: session.access_token_ttl().num_seconds(),
            user,
        })
}

/// POST /auth/register
///
/// # Errors
/// - 400: Validation errors or email already registered
/// - 500: Internal server error
pub async fn register(
    form: web::Json<NewUser>,
    users: web::Data<UserService>,
    session: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let user = users.register(form.into_inner()).await?;
    let tokens = session.issue_tokens(&user).await?;

    Ok(session_response(HttpResponse::Created(), tokens, user, &session))
}

/// POST /auth/login
///
/// # Errors
/// - 401: Unknown email or wrong password (indistinguishable)
/// - 403: Account is inactive
pub async fn login(
    form: web::Json<LoginRequest>,
    users: web::Data<UserService>,
    session: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let user = users.login(&form.email, &form.password).await?;
    let tokens = session.issue_tokens(&user).await?;

    Ok(session_response(HttpResponse::Ok(), tokens, user, &session))
}

/// POST /auth/renew
///
/// Takes the refresh token from the body, falling back to the cookie. The
/// presented token is rotated out on success.
///
/// # Errors
/// - 401: Missing, unknown, expired or superseded refresh token
pub async fn renew(
    req: HttpRequest,
    body: Option<web::Json<RenewRequest>>,
    users: web::Data<UserService>,
    session: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let presented = body
        .map(|json| json.into_inner().refresh_token)
        .filter(|token| !token.is_empty())
        .or_else(|| req.cookie(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .ok_or(AuthError::InvalidToken)?;

    let record = session.validate_refresh_token(&presented).await?;

    let user = match users.get_by_id(record.user_id).await {
        Ok(user) => user,
        Err(AppError::User(UserError::NotFound)) => {
            tracing::warn!(user_id = %record.user_id, "Refresh token owner no longer exists");
            return Err(AuthError::InvalidToken.into());
        }
        Err(e) => return Err(e),
    };
    if !user.is_active {
        return Err(AuthError::AccountInactive.into());
    }

    let tokens = session.renew_presented(&record, &user).await?;

    Ok(session_response(HttpResponse::Ok(), tokens, user, &session))
}

/// PUT /auth/logout
///
/// Requires authentication. Succeeds even when there is no session left.
pub async fn logout(
    claims: web::ReqData<AccessTokenClaims>,
    session: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    session.delete_session_for_user(claims.user_id).await?;

    Ok(HttpResponse::Ok()
        .cookie(expired_refresh_cookie())
        .json(serde_json::json!({ "message": "Logged out" })))
}
