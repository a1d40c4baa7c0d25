use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use cmdex_core_types::Sensitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{EngineError, Result};

/// User account whose credential is mutated by credential commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub credential: Option<Credential>,
    pub revision: u64,
}

impl User {
    pub const ENTITY_TYPE: &'static str = "User";

    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            first_name: None,
            last_name: None,
            email: None,
            credential: None,
            revision: 1,
        }
    }
}

/// Argon2id password hash in PHC string format (salt and parameters included)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub hash: String,
}

impl Credential {
    /// Hash `password` with a fresh random salt
    ///
    /// # Errors
    ///
    /// `Internal` when the hasher rejects its input.
    pub fn derive(password: &Sensitive<String>) -> Result<Self> {
        let salt = SaltString::from_b64(&STANDARD_NO_PAD.encode(Uuid::new_v4().as_bytes()))
            .map_err(hashing_error)?;
        let hash = Argon2::default()
            .hash_password(password.expose().as_bytes(), &salt)
            .map_err(hashing_error)?;
        Ok(Self {
            hash: hash.to_string(),
        })
    }

    /// Check a candidate password against the stored hash
    ///
    /// An unparseable stored hash verifies nothing.
    pub fn verify(&self, candidate: &str) -> bool {
        PasswordHash::new(&self.hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(candidate.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("hash", &Sensitive::new(&self.hash))
            .finish()
    }
}

fn hashing_error(err: argon2::password_hash::Error) -> EngineError {
    EngineError::internal(format!("password hashing failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_verifies_original_password_only() {
        let cred = Credential::derive(&Sensitive::new("Str0ng!Passw0rd".to_string())).unwrap();
        assert!(cred.verify("Str0ng!Passw0rd"));
        assert!(!cred.verify("str0ng!passw0rd"));
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        let pw = Sensitive::new("same".to_string());
        let a = Credential::derive(&pw).unwrap();
        let b = Credential::derive(&pw).unwrap();
        assert_ne!(a.hash, b.hash);
        assert!(a.verify("same") && b.verify("same"));
    }

    #[test]
    fn test_malformed_stored_hash_verifies_nothing() {
        let cred = Credential {
            hash: "not-a-phc-string".to_string(),
        };
        assert!(!cred.verify("not-a-phc-string"));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let cred = Credential::derive(&Sensitive::new("pw".to_string())).unwrap();
        let debug = format!("{:?}", cred);
        assert!(!debug.contains(&cred.hash));
        assert!(cred.hash.starts_with("$argon2id$"));
    }
}
