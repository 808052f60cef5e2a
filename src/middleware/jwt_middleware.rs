/// JWT Authentication Middleware
///
/// Stage one of the authorization gate. Validates the bearer token from the
/// Authorization header and injects its claims into request extensions for
/// downstream middleware and handlers.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::AccessTokenCodec;
use crate::error::{AppError, AuthError};

/// Extract the token from a `Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AppError> {
    let token = header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or_default();

    if token.is_empty() {
        return Err(AuthError::MissingToken.into());
    }
    Ok(token)
}

/// Rejects with 401 unless the request carries a valid access token
pub struct Authenticate {
    codec: Arc<AccessTokenCodec>,
}

impl Authenticate {
    pub fn new(codec: Arc<AccessTokenCodec>) -> Self {
        Self { codec }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authenticate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticateService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthenticateService {
            service: Rc::new(service),
            codec: self.codec.clone(),
        }))
    }
}

pub struct AuthenticateService<S> {
    service: Rc<S>,
    codec: Arc<AccessTokenCodec>,
}

impl<S, B> Service<ServiceRequest> for AuthenticateService<S>
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
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let verified =
            bearer_token(header).and_then(|token| self.codec.verify(token));

        match verified {
            Ok(claims) => {
                tracing::debug!(
                    user_id = %claims.user_id,
                    role = %claims.role,
                    "Access token accepted"
                );
                req.extensions_mut().insert(claims);

                let service = self.service.clone();
                Box::pin(async move {
                    service
                        .call(req)
                        .await
                        .map(ServiceResponse::map_into_left_body)
                })
            }
            Err(e) => {
                tracing::warn!(path = %req.path(), error = %e, "Request not authenticated");
                let response = req.error_response(e).map_into_right_body();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}
