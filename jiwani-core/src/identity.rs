use uuid::Uuid;

use crate::{CoreError, CoreResult};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_NAME_LEN: usize = 100;

/// Salted bcrypt hash of a plaintext password.
pub fn hash_password(plain: &str, cost: u32) -> CoreResult<String> {
    bcrypt::hash(plain, cost).map_err(|e| CoreError::InternalError(format!("password hashing failed: {}", e)))
}

/// Constant-time check of a plaintext password against a stored hash.
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    match bcrypt::verify(plain, hash) {
        Ok(ok) => ok,
        Err(e) => {
            tracing::warn!("Stored password hash could not be parsed: {}", e);
            false
        }
    }
}

pub fn validate_password(plain: &str) -> CoreResult<()> {
    if plain.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Shape check only: one `@`, non-empty local part, dotted domain.
pub fn validate_email(email: &str) -> CoreResult<()> {
    let invalid = || CoreError::validation(format!("invalid email '{}'", email));
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    match domain.split_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() && !domain.ends_with('.') => Ok(()),
        _ => Err(invalid()),
    }
}

pub fn validate_username(username: &str) -> CoreResult<()> {
    let ok = (3..=32).contains(&username.len())
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !ok {
        return Err(CoreError::validation(
            "username must be 3-32 characters of letters, digits, '_' or '.'",
        ));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> CoreResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::validation(format!("name must be 1-{} characters", MAX_NAME_LEN)));
    }
    Ok(())
}

/// Opaque single-use token for email links.
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_salted_and_verifiable() {
        let first = hash_password("correct horse", 4).unwrap();
        let second = hash_password("correct horse", 4).unwrap();

        assert_ne!(first, "correct horse");
        assert_ne!(first, second);
        assert!(verify_password("correct horse", &first));
        assert!(!verify_password("wrong horse", &first));
        assert!(!verify_password("correct horse", "plaintext-in-db"));
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("siti@jiwani.id").is_ok());
        assert!(validate_email("siti@jiwani").is_err());
        assert!(validate_email("@jiwani.id").is_err());
        assert!(validate_email("siti jiwani@x.id").is_err());
        assert!(validate_email("siti@jiwani.").is_err());
    }

    #[test]
    fn test_password_and_username_rules() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("longenough").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("budi_s").is_ok());
        assert!(validate_username("budi s").is_err());
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, generate_token());
    }
}
