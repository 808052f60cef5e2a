/// Authentication module
///
/// Password hashing, access token signing/verification, refresh token
/// generation and the session service that ties them together.

mod claims;
mod jwt;
mod password;
mod refresh_token;
mod session;

pub use claims::AccessTokenClaims;
pub use jwt::AccessTokenCodec;
pub use password::{hash_password, verify_password};
pub use refresh_token::generate_refresh_token;
pub use session::{SessionService, TokenPair};
