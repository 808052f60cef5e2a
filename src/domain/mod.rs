/// Domain model
///
/// Plain data types shared by the services and the persistence layer.

mod credential;
mod refresh_token;
mod user;

pub use credential::Credential;
pub use refresh_token::RefreshToken;
pub use user::{ProfileChanges, User, UserRole};
