/// Profile Routes
///
/// All of these sit behind `Authenticate`; the role route additionally
/// behind `RequireRole::admin()`.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AccessTokenClaims, SessionService};
use crate::error::{AppError, ValidationError};
use crate::routes::auth::expired_refresh_cookie;
use crate::users::{ProfileUpdate, UserService};

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirmation: String,
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

/// GET /me
pub async fn get_current_user(
    claims: web::ReqData<AccessTokenClaims>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let user = users.get_by_id(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// PATCH /me
///
/// # Errors
/// - 400: Invalid field values, or no field given at all
pub async fn update_current_user(
    claims: web::ReqData<AccessTokenClaims>,
    form: web::Json<ProfileUpdate>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let user = users
        .update_profile(claims.user_id, form.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(user))
}

/// PUT /me/password
///
/// A password change ends the current session; the client has to log in
/// again.
pub async fn change_password(
    claims: web::ReqData<AccessTokenClaims>,
    form: web::Json<ChangePasswordRequest>,
    users: web::Data<UserService>,
    session: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    users
        .change_password(
            claims.user_id,
            &form.current_password,
            &form.new_password,
            &form.new_password_confirmation,
        )
        .await?;
    session.delete_session_for_user(claims.user_id).await?;

    Ok(HttpResponse::NoContent()
        .cookie(expired_refresh_cookie())
        .finish())
}

/// PATCH /{id}/role
///
/// # Errors
/// - 400: Malformed id or unknown role
/// - 404: No such user
pub async fn update_user_role(
    path: web::Path<String>,
    form: web::Json<UpdateRoleRequest>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let id = Uuid::parse_str(path.as_str()).map_err(|_| ValidationError::InvalidFormat("id"))?;

    let user = users.update_role(id, &form.role).await?;
    Ok(HttpResponse::Ok().json(user))
}
