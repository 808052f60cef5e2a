mod auth;
mod health_check;
mod users;

pub use auth::{login, logout, register, renew, AuthResponse, REFRESH_COOKIE};
pub use health_check::health_check;
pub use users::{change_password, get_current_user, update_current_user, update_user_role};
