/// Refresh token values
///
/// 32 bytes from the thread-local CSPRNG, URL-safe base64 encoded. The value
/// has no structure and is only ever looked up, never decoded.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use rand::RngCore;

const REFRESH_TOKEN_BYTES: usize = 32;

pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE.encode(bytes)
}
