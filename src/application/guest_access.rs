//! Guest orders are protected by an email plus a per-order password that is
//! stored only as an Argon2 hash.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::domain::errors::DomainError;

pub fn hash_password(password: &str) -> Result<String, DomainError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DomainError::Internal(format!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn validate_guest(email: &str, password: &str) -> Result<(), DomainError> {
    let email = email.trim();
    if email.len() < 3 || !email.contains('@') {
        return Err(DomainError::InvalidInput("guest email is invalid".into()));
    }
    if password.len() < 4 {
        return Err(DomainError::InvalidInput(
            "guest order password must be at least 4 characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[test]
    fn guest_details_are_validated() {
        assert!(validate_guest("a@b.c", "1234").is_ok());
        assert!(validate_guest("nobody", "1234").is_err());
        assert!(validate_guest("a@b.c", "12").is_err());
    }
}
