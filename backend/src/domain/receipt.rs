//! Receipt codes proving participation without identifying the respondent.
//!
//! Codes look like `JCSA-2025Q3-ABCD-EFGH`. Only the SHA-256 digest of a
//! normalised code is persisted, so a lost code cannot be recovered.

use std::fmt;

use rand::Rng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::survey::SurveyPeriod;

/// Alphabet without the look-alike characters `0`, `O`, `1`, and `I`.
const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const BLOCK_LEN: usize = 4;
const PREFIX: &str = "JCSA";

/// Plaintext receipt code, wiped from memory on drop.
///
/// Shown to the respondent once and never stored.
#[derive(Clone, PartialEq, Eq)]
pub struct ReceiptCode(Zeroizing<String>);

impl ReceiptCode {
    /// Generate a fresh code using the thread-local RNG.
    pub fn generate(period: SurveyPeriod) -> Self {
        Self::generate_with(period, &mut rand::thread_rng())
    }

    /// Generate a fresh code from a caller-supplied RNG.
    pub fn generate_with<R: Rng + ?Sized>(period: SurveyPeriod, rng: &mut R) -> Self {
        let first = random_block(rng);
        let second = random_block(rng);
        Self(Zeroizing::new(format!(
            "{PREFIX}-{}Q{}-{first}-{second}",
            period.year(),
            period.quarter()
        )))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Digest to persist for this code.
    pub fn hash(&self) -> String {
        hash_receipt_code(self.as_str())
    }
}

impl fmt::Debug for ReceiptCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReceiptCode(<redacted>)")
    }
}

fn random_block<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..BLOCK_LEN)
        .map(|_| {
            let index = rng.gen_range(0..CHARSET.len());
            CHARSET.get(index).copied().map_or('A', char::from)
        })
        .collect()
}

/// Canonical form used before hashing: trimmed and uppercased.
pub fn normalise_receipt_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Lowercase hex SHA-256 of the normalised code.
///
/// # Examples
/// ```
/// use survey_backend::domain::hash_receipt_code;
///
/// assert_eq!(
///     hash_receipt_code(" jcsa-2025q3-abcd-efgh "),
///     hash_receipt_code("JCSA-2025Q3-ABCD-EFGH")
/// );
/// ```
pub fn hash_receipt_code(code: &str) -> String {
    let normalised = Zeroizing::new(normalise_receipt_code(code));
    hex::encode(Sha256::digest(normalised.as_bytes()))
}

/// Compare a code against a stored digest in constant time.
pub fn verify_receipt_code(code: &str, stored_hash: &str) -> bool {
    let candidate = hash_receipt_code(code);
    let (left, right) = (candidate.as_bytes(), stored_hash.as_bytes());
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0_u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
