//! Session credentials — argon2id password hashing and HS256 session
//! tokens.
//!
//! Tokens are stateless: the server keeps no revocation list. Revocation
//! is achieved indirectly by deactivating the user or the access key.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::{Role, User};

/// Claims embedded in a session token.
///
/// `tenant_id` is always populated at mint time (login resolves it from
/// the user's access-key bindings); it stays optional in the decode path
/// so a foreign token surfaces the downstream warning instead of a parse
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub handle: String,
    pub role: Role,
    pub tenant_id: Option<Uuid>,
    pub iat: i64,
    pub exp: i64,
}

pub struct CredentialIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    login_ttl: Duration,
    refresh_ttl: Duration,
}

impl CredentialIssuer {
    pub fn new(secret: &str, login_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            login_ttl,
            refresh_ttl,
        }
    }

    /// Mint a login token for the user, bound to the resolved tenant.
    pub fn mint(&self, user: &User, tenant_id: Option<Uuid>) -> Result<String, AppError> {
        self.mint_with_ttl(user, tenant_id, self.login_ttl)
    }

    pub fn mint_with_ttl(
        &self,
        user: &User,
        tenant_id: Option<Uuid>,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user.id,
            handle: user.handle.clone(),
            role: user.role,
            tenant_id,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("token encoding: {e}")))
    }

    /// Verify signature and expiry.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AppError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::InvalidToken)
    }

    /// Re-issue a token from an existing one without re-authentication.
    ///
    /// "Ignore expiry" applies to the expiry check only — an unverifiable
    /// signature is never refreshed. Timing claims are replaced; all
    /// other claims pass through unchanged.
    pub fn refresh(&self, token: &str) -> Result<String, AppError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.validate_exp = false;
        let mut claims = decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::InvalidToken)?;
        let now = Utc::now();
        claims.iat = now.timestamp();
        claims.exp = (now + self.refresh_ttl).timestamp();
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("token encoding: {e}")))
    }
}

/// Argon2id PHC-string hash of a password.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing: {e}")))
}

/// Constant-time verification against a stored PHC string. A malformed
/// stored hash verifies as false rather than erroring.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn issuer() -> CredentialIssuer {
        CredentialIssuer::new("test-secret", Duration::days(7), Duration::hours(8))
    }

    fn test_user(role: Role) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Maria".into(),
            handle: "maria".into(),
            password_hash: String::new(),
            phone: None,
            role,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_mint_verify_roundtrip() {
        let issuer = issuer();
        let user = test_user(Role::Admin);
        let tenant = Uuid::new_v4();
        let token = issuer.mint(&user, Some(tenant)).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.handle, "maria");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.tenant_id, Some(tenant));
    }

    #[test]
    fn test_expired_token_fails_verify_but_refreshes() {
        let issuer = issuer();
        let user = test_user(Role::Operator);
        let tenant = Uuid::new_v4();
        let expired = issuer
            .mint_with_ttl(&user, Some(tenant), Duration::hours(-1))
            .unwrap();
        assert!(matches!(
            issuer.verify(&expired),
            Err(AppError::InvalidToken)
        ));

        let fresh = issuer.refresh(&expired).unwrap();
        let claims = issuer.verify(&fresh).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.handle, user.handle);
        assert_eq!(claims.role, Role::Operator);
        assert_eq!(claims.tenant_id, Some(tenant));
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_tampered_signature_never_refreshes() {
        let issuer = issuer();
        let user = test_user(Role::Operator);
        let token = issuer.mint(&user, None).unwrap();
        let mut tampered = token[..token.len() - 2].to_string();
        tampered.push_str("xx");
        assert!(matches!(
            issuer.refresh(&tampered),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let user = test_user(Role::Admin);
        let other = CredentialIssuer::new("other-secret", Duration::days(7), Duration::hours(8));
        let token = other.mint(&user, None).unwrap();
        assert!(issuer().verify(&token).is_err());
        assert!(issuer().refresh(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(matches!(
            issuer().refresh("not-a-token"),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }
}
