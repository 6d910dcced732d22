//! Time-based one-time codes (RFC 6238).
//!
//! The generator is the keyed primitive both sides of a porthop link share:
//! HMAC-SHA1 over the big-endian counter `floor(time / period)`, reduced with
//! the RFC 4226 dynamic truncation to [`CODE_DIGITS`] decimal digits.
//!
//! Secrets are RFC 4648 base32 strings, the format authenticator tooling
//! produces. Decoding is lenient in the same way common TOTP libraries are:
//! surrounding whitespace is trimmed, case is ignored and padding is optional.

use crate::error::CodeGenerationError;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::fmt;
use zeroize::Zeroizing;

type HmacSha1 = Hmac<Sha1>;

/// Number of decimal digits in a generated code
pub const CODE_DIGITS: u32 = 6;

const CODE_MODULUS: u32 = 10u32.pow(CODE_DIGITS);

/// Keyed code generator.
#[derive(Clone)]
pub struct TotpGenerator {
    key: Zeroizing<Vec<u8>>,
}

impl TotpGenerator {
    /// Create a generator from a base32 encoded secret.
    ///
    /// # Errors
    ///
    /// Returns [`CodeGenerationError::EmptySecret`] for a blank secret and
    /// [`CodeGenerationError::InvalidSecret`] if it is not valid base32.
    pub fn from_base32(secret: &str) -> Result<Self, CodeGenerationError> {
        let key = decode_base32(secret)?;
        Ok(Self { key })
    }

    /// Create a generator from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodeGenerationError::EmptySecret`] if `key` is empty.
    pub fn from_bytes(key: &[u8]) -> Result<Self, CodeGenerationError> {
        if key.is_empty() {
            return Err(CodeGenerationError::EmptySecret);
        }
        Ok(Self {
            key: Zeroizing::new(key.to_vec()),
        })
    }

    /// Generate the code for the period containing `time` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Fails for a zero `period` or a `time` before the epoch.
    pub fn code(&self, time: i64, period: u32) -> Result<u32, CodeGenerationError> {
        if period == 0 {
            return Err(CodeGenerationError::ZeroPeriod);
        }
        if time < 0 {
            return Err(CodeGenerationError::NegativeTime(time));
        }

        let counter = time as u64 / u64::from(period);

        let mut mac = HmacSha1::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(&counter.to_be_bytes());
        let digest: [u8; 20] = mac.finalize().into_bytes().into();

        // RFC 4226 section 5.3 dynamic truncation
        let offset = usize::from(digest[19] & 0x0f);
        let binary = u32::from_be_bytes([
            digest[offset] & 0x7f,
            digest[offset + 1],
            digest[offset + 2],
            digest[offset + 3],
        ]);

        Ok(binary % CODE_MODULUS)
    }
}

impl fmt::Debug for TotpGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TotpGenerator")
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Decode an RFC 4648 base32 string (standard alphabet).
fn decode_base32(secret: &str) -> Result<Zeroizing<Vec<u8>>, CodeGenerationError> {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return Err(CodeGenerationError::EmptySecret);
    }

    let data = trimmed.trim_end_matches('=');
    if data.is_empty() {
        return Err(invalid("secret consists of padding only"));
    }

    // A final quantum can only carry 2, 4, 5 or 7 characters.
    if matches!(data.len() % 8, 1 | 3 | 6) {
        return Err(invalid(format!(
            "{} characters cannot form whole bytes",
            data.len()
        )));
    }

    let mut out = Zeroizing::new(Vec::with_capacity(data.len() * 5 / 8));
    let mut buffer: u64 = 0;
    let mut bits = 0u32;

    for (position, ch) in data.chars().enumerate() {
        let value = match ch.to_ascii_uppercase() {
            c @ 'A'..='Z' => c as u64 - 'A' as u64,
            c @ '2'..='7' => c as u64 - '2' as u64 + 26,
            other => {
                return Err(invalid(format!(
                    "unexpected character {other:?} at position {position}"
                )));
            }
        };

        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    Ok(out)
}

fn invalid(reason: impl Into<String>) -> CodeGenerationError {
    CodeGenerationError::InvalidSecret {
        reason: reason.into(),
    }
}
