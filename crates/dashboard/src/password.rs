//! bcrypt password hashes (`$2b$<cost>$<salt+hash>`).

use bcrypt::BcryptError;
use std::sync::OnceLock;

#[cfg(not(test))]
const COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const COST: u32 = 4;

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, BcryptError> {
    bcrypt::hash(password, COST)
}

/// Check `password` against a user's stored hash. Malformed hashes never verify.
///
/// With no stored hash the password is still checked against a fixed one, so
/// an unknown username costs as much as a wrong password.
pub fn verify_password(password: &str, stored: Option<&str>) -> bool {
    let Some(stored) = stored else {
        if let Some(dummy) = dummy_hash() {
            let _ = bcrypt::verify(password, dummy);
        }
        return false;
    };

    bcrypt::verify(password, stored).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "stored password hash is malformed");
        false
    })
}

fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password("no such user").ok()).as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let stored = hash_password("correct horse").unwrap();
        assert!(stored.starts_with("$2b$04$"));
        assert!(verify_password("correct horse", Some(&stored)));
        assert!(!verify_password("Correct horse", Some(&stored)));
        assert!(!verify_password("", Some(&stored)));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn test_malformed_hashes_reject() {
        for stored in ["", "plaintext", "$2b$04$short", "sha256$1$salt$hash"] {
            assert!(!verify_password("anything", Some(stored)), "{stored}");
        }
    }

    #[test]
    fn test_missing_user_never_verifies() {
        assert!(!verify_password("no such user", None));
        assert!(dummy_hash().is_some_and(|h| h.starts_with("$2b$")));
    }
}
