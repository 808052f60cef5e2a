/// Middleware module
///
/// The two stages of the authorization gate. Stage one (`Authenticate`)
/// answers 401, stage two (`RequireRole`) answers 403.

mod jwt_middleware;
mod role_middleware;

pub use jwt_middleware::{bearer_token, Authenticate};
pub use role_middleware::{authorize, RequireRole};
