use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::SessionService;
use crate::configuration::JwtSettings;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::{Authenticate, RequireRole};
use crate::routes::{
    change_password, get_current_user, health_check, login, logout, register, renew,
    update_current_user, update_user_role,
};
use crate::store::Repositories;
use crate::users::UserService;

/// Services shared by every worker
pub struct AppServices {
    pub users: web::Data<UserService>,
    pub session: web::Data<SessionService>,
}

impl AppServices {
    pub fn new(repositories: &Repositories, jwt: &JwtSettings) -> Result<Self, AppError> {
        let session = SessionService::from_settings(jwt, repositories.refresh_tokens.clone())?;

        Ok(Self {
            users: web::Data::new(UserService::new(repositories)),
            session: web::Data::new(session),
        })
    }
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        AppError::from(ValidationError::MalformedBody(err.to_string())).into()
    })
}

pub fn run(listener: TcpListener, services: AppServices) -> Result<Server, std::io::Error> {
    let codec = services.session.codec();
    let users = services.users;
    let session = services.session;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)
            .app_data(json_config())
            .app_data(users.clone())
            .app_data(session.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/v0/users")
                    .service(
                        web::scope("/auth")
                            .route("/register", web::post().to(register))
                            .route("/login", web::post().to(login))
                            .route("/renew", web::post().to(renew))
                            .service(
                                web::resource("/logout")
                                    .wrap(Authenticate::new(codec.clone()))
                                    .route(web::put().to(logout)),
                            ),
                    )
                    .service(
                        web::scope("/me")
                            .wrap(Authenticate::new(codec.clone()))
                            .route("", web::get().to(get_current_user))
                            .route("", web::patch().to(update_current_user))
                            .route("/password", web::put().to(change_password)),
                    )
                    .service(
                        // Authenticate is the outer layer and runs first
                        web::resource("/{id}/role")
                            .wrap(RequireRole::admin())
                            .wrap(Authenticate::new(codec.clone()))
                            .route(web::patch().to(update_user_role)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
