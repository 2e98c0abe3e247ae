use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::error::NowPaymentsError;

type HmacSha512 = Hmac<Sha512>;

/// Compute HMAC-SHA512 over `message` using the shared secret.
/// Returns the lower-case hex-encoded MAC (128 characters).
pub fn compute_hmac(secret: &[u8], message: &[u8]) -> Result<String, NowPaymentsError> {
    let mut mac = HmacSha512::new_from_slice(secret)
        .map_err(|_| NowPaymentsError::InvalidInput("secret required"))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
