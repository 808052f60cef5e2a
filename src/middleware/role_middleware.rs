/// Role Gate Middleware
///
/// Stage two of the authorization gate. Reads the claims `Authenticate`
/// placed in request extensions and rejects with 403 when the caller's role
/// is not allowed. Must be wrapped *inside* `Authenticate`.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::AccessTokenClaims;
use crate::domain::UserRole;
use crate::error::{AppError, AuthError};

/// Pass/reject decision for already-authenticated claims
pub fn authorize(claims: Option<&AccessTokenClaims>, allowed: &[UserRole]) -> Result<(), AppError> {
    match claims {
        Some(claims) if !claims.user_id.is_nil() && claims.has_any_role(allowed) => Ok(()),
        _ => Err(AuthError::Forbidden.into()),
    }
}

pub struct RequireRole {
    allowed: Rc<Vec<UserRole>>,
}

impl RequireRole {
    pub fn new(allowed: Vec<UserRole>) -> Self {
        Self {
            allowed: Rc::new(allowed),
        }
    }

    pub fn admin() -> Self {
        Self::new(vec![UserRole::Admin])
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireRoleService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequireRoleService {
            service: Rc::new(service),
            allowed: self.allowed.clone(),
        }))
    }
}

pub struct RequireRoleService<S> {
    service: Rc<S>,
    allowed: Rc<Vec<UserRole>>,
}

impl<S, B> Service<ServiceRequest> for RequireRoleService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let decision = authorize(
            req.extensions().get::<AccessTokenClaims>(),
            &self.allowed,
        );

        if let Err(e) = decision {
            tracing::warn!(path = %req.path(), "Role not permitted");
            let response = req.error_response(e).map_into_right_body();
            return Box::pin(async move { Ok(response) });
        }

        let service = self.service.clone();
        Box::pin(async move {
            service
                .call(req)
                .await
                .map(ServiceResponse::map_into_left_body)
        })
    }
}
