//! # Utilities
//!
//! Short code generation and validation helpers.

use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;

use crate::error::Result;

// =====================================
// Constants
// =====================================
/// Alphabet of generated short codes (62 symbols).
pub const SHORT_CODE_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Default length of a generated short code.
pub const DEFAULT_SHORT_CODE_LENGTH: usize = 6;

/// Maximum accepted length of a long URL.
pub const MAX_URL_LENGTH: usize = 2048;

/// Bytes at or above this value are rejected so that `byte % 62` stays uniform.
/// 248 = 62 * 4.
const REJECTION_THRESHOLD: u8 = (u8::MAX / SHORT_CODE_CHARS.len() as u8) * SHORT_CODE_CHARS.len() as u8;

// =====================================
// Lazy Statics
// =====================================
/// Matches a string made only of the short code alphabet.
pub static VALID_SHORT_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]+$").expect("Invalid regex pattern")
});

// =====================================
// Short Code Generation
// =====================================
/// Generates a random short code of `length` characters.
///
/// Every character is drawn independently and uniformly from
/// [`SHORT_CODE_CHARS`] using the operating system's entropy source, so codes
/// cannot be predicted from creation order or time.
///
/// # Errors
/// Returns [`crate::AppError::RandomSource`] if the OS entropy source fails.
///
/// # Example
/// ```rust
/// use link_shortener::utils::generate_short_code;
///
/// let code = generate_short_code(6).unwrap();
/// assert_eq!(code.len(), 6);
/// ```
pub fn generate_short_code(length: usize) -> Result<String> {
    generate_short_code_with(&mut OsRng, length)
}

/// Same as [`generate_short_code`] with a caller supplied random source.
///
/// # Errors
/// Propagates the failure of `rng.try_fill_bytes`.
pub fn generate_short_code_with<R: RngCore + ?Sized>(rng: &mut R, length: usize) -> Result<String> {
    let mut code = String::with_capacity(length);
    let mut buf = [0u8; 32];

    while code.len() < length {
        rng.try_fill_bytes(&mut buf)?;

        for &byte in buf.iter().filter(|b| **b < REJECTION_THRESHOLD) {
            if code.len() == length {
                break;
            }
            let idx = usize::from(byte) % SHORT_CODE_CHARS.len();
            code.push(SHORT_CODE_CHARS[idx] as char);
        }
    }

    Ok(code)
}

// =====================================
// Validation Functions
// =====================================
/// Whether `code` only uses the short code alphabet.
///
/// # Example
/// ```rust
/// use link_shortener::utils::is_valid_short_code;
///
/// assert!(is_valid_short_code("abc123"));
/// assert!(!is_valid_short_code("abc-123"));
/// ```
#[must_use]
pub fn is_valid_short_code(code: &str) -> bool {
    VALID_SHORT_CODE.is_match(code)
}

/// Whether `url_str` is an absolute http(s) URL of acceptable length.
#[must_use]
pub fn is_valid_url(url_str: &str) -> bool {
    if url_str.len() > MAX_URL_LENGTH {
        return false;
    }

    match url::Url::parse(url_str) {
        Ok(url) => {
            let scheme = url.scheme();
            (scheme == "http" || scheme == "https") && url.has_host()
        }
        Err(_) => false,
    }
}
