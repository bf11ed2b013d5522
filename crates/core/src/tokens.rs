//! Random one-time tokens (email verification, password reset).
//!
//! The plaintext goes to the user by email; only the SHA-256 hash is stored.

use rand::Rng;

/// Length of generated one-time tokens (alphanumeric characters).
pub const TOKEN_LENGTH: usize = 48;

/// Purpose tag for email verification tokens.
pub const PURPOSE_VERIFY_EMAIL: &str = "verify_email";

/// Purpose tag for password reset tokens.
pub const PURPOSE_RESET_PASSWORD: &str = "reset_password";

/// Lifetime of an email verification token.
pub const VERIFY_EMAIL_TTL_HOURS: i64 = 24;

/// Lifetime of a password reset token.
pub const RESET_PASSWORD_TTL_HOURS: i64 = 1;

/// A freshly generated token: plaintext for the user, hash for storage.
pub struct OneTimeToken {
    pub plaintext: String,
    pub hash: String,
}

/// Generate a new random one-time token.
pub fn generate_token() -> OneTimeToken {
    let plaintext: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect();
    let hash = hash_token(&plaintext);
    OneTimeToken { plaintext, hash }
}

/// Hash a plaintext token for lookup.
pub fn hash_token(token: &str) -> String {
    crate::hashing::sha256_hex(token.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_is_alphanumeric_and_hashed() {
        let token = generate_token();
        assert_eq!(token.plaintext.len(), TOKEN_LENGTH);
        assert!(token.plaintext.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(token.hash, hash_token(&token.plaintext));
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(generate_token().plaintext, generate_token().plaintext);
    }
}
