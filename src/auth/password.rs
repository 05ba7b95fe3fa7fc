use anyhow::anyhow;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Argon2id digest of `password` as a PHC string (`$argon2id$v=19$...`).
pub fn hash(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>()).map_err(|e| anyhow!("salt: {e}"))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("hashing password: {e}"))?;
    Ok(hash.to_string())
}

/// Checks `password` against a stored PHC string. Unparsable hashes never match.
pub fn verify(stored: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_the_right_password_only() {
        let stored = hash("hunter22").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify(&stored, "hunter22"));
        assert!(!verify(&stored, "hunter23"));
        assert!(!verify(&stored, ""));
    }

    #[test]
    fn salts_differ_per_hash() {
        let a = hash("same password").unwrap();
        let b = hash("same password").unwrap();
        assert_ne!(a, b);
        assert!(verify(&a, "same password") && verify(&b, "same password"));
    }

    #[test]
    fn garbage_hashes_never_match() {
        assert!(!verify("", "hunter22"));
        assert!(!verify("not-a-phc-string", "hunter22"));
    }
}
