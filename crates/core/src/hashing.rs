//! SHA-256 digests and HMAC-SHA256 signing.
//!
//! Used for refresh/one-time token storage, signed GPU webhook URLs, and
//! payment webhook signature checks.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Compute an HMAC-SHA256 signature and return it hex-encoded.
pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded HMAC-SHA256 signature in constant time.
///
/// Returns `false` for malformed hex as well as for mismatches.
pub fn verify_hmac_sha256_hex(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Some(expected) = hex::decode(signature_hex).ok() else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        let hash = sha256_hex(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hmac_matches_rfc4231_case_2() {
        let sig = hmac_sha256_hex("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verify_accepts_own_signature() {
        let sig = hmac_sha256_hex("secret", b"image:42");
        assert!(verify_hmac_sha256_hex("secret", b"image:42", &sig));
    }

    #[test]
    fn verify_rejects_tampered_payload_and_bad_hex() {
        let sig = hmac_sha256_hex("secret", b"image:42");
        assert!(!verify_hmac_sha256_hex("secret", b"image:43", &sig));
        assert!(!verify_hmac_sha256_hex("other", b"image:42", &sig));
        assert!(!verify_hmac_sha256_hex("secret", b"image:42", "zz"));
        assert!(!verify_hmac_sha256_hex("secret", b"image:42", "abc"));
    }
}
