//! Credential hashing and session tokens.
//!
//! Passwords, PINs and secondary PINs are stored as argon2 PHC strings.
//! A successful login yields a signed JWT whose `jti` names a server-side
//! session (see [`crate::gate::session`]); the token alone is not enough to
//! act once the session is gone.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

use sgir_core::{CoreError, Principal, Role};

use crate::error::{ApiError, ApiResult};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "sgir_session";

/// Hard upper bound on a token's life, regardless of activity.
const TOKEN_LIFETIME_HOURS: i64 = 16;

// =============================================================================
// Credential Hashing
// =============================================================================

/// Argon2id hasher with a configurable memory cost.
///
/// Verification reads the parameters embedded in each stored hash, so
/// lowering the cost later never locks anyone out.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    pub fn new(memory_kib: u32) -> ApiResult<Self> {
        let params = Params::new(memory_kib, Params::DEFAULT_T_COST, Params::DEFAULT_P_COST, None)
            .map_err(|e| ApiError::internal(format!("Invalid argon2 parameters: {}", e)))?;
        Ok(CredentialHasher { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a secret for storage.
    pub fn hash(&self, secret: &str) -> ApiResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| ApiError::internal(format!("Failed to hash secret: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Verify a secret against a stored hash. Malformed hashes never match.
    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => return false,
        };
        self.argon2().verify_password(secret.as_bytes(), &parsed).is_ok()
    }
}

// =============================================================================
// Session Tokens
// =============================================================================

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal id)
    pub sub: String,

    /// Role at login time
    pub role: Role,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// Session id
    pub jti: String,
}

impl Claims {
    pub fn principal_id(&self) -> ApiResult<i64> {
        self.sub
            .parse()
            .map_err(|_| ApiError::from(CoreError::Unauthenticated))
    }
}

/// JWT token manager.
pub struct JwtManager {
    secret: String,
}

impl JwtManager {
    pub fn new(secret: String) -> Self {
        JwtManager { secret }
    }

    /// Sign a token for `principal` bound to session `session_id`.
    pub fn generate_session_token(&self, principal: &Principal, session_id: &str) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(TOKEN_LIFETIME_HOURS);

        let claims = Claims {
            sub: principal.id.to_string(),
            role: principal.role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: session_id.to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::internal(format!("Failed to generate token: {}", e)))
    }

    /// Validate signature and expiry, then decode.
    pub fn validate_token(&self, token: &str) -> ApiResult<Claims> {
        let token_data: TokenData<Claims> = decode(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected session token");
            ApiError::from(CoreError::Unauthenticated)
        })?;

        Ok(token_data.claims)
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ").map(str::trim)
}

/// Extract the session token from a `Cookie` header.
pub fn extract_session_cookie(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

/// `Set-Cookie` value for a fresh session.
pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

/// `Set-Cookie` value that clears the session cookie.
pub fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal {
            id: 7,
            username: "ana".to_string(),
            display_name: "Ana".to_string(),
            role: Role::Waiter,
            active: true,
            password_hash: None,
            pin_hash: None,
            secondary_pin_hash: None,
            areas: vec![],
            last_qr_issued: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new("test-secret".to_string());
        let token = manager.generate_session_token(&principal(), "sess-1").unwrap();

        let claims = manager.validate_token(&token).unwrap();
        assert_eq!(claims.principal_id().unwrap(), 7);
        assert_eq!(claims.role, Role::Waiter);
        assert_eq!(claims.jti, "sess-1");
    }

    #[test]
    fn test_wrong_secret_is_unauthenticated() {
        let token = JwtManager::new("a".to_string())
            .generate_session_token(&principal(), "sess-1")
            .unwrap();
        let err = JwtManager::new("b".to_string()).validate_token(&token).unwrap_err();
        assert_eq!(err.code, "unauthenticated");
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = CredentialHasher::new(1024).unwrap();
        let hash = hasher.hash("4821").unwrap();
        assert!(hasher.verify("4821", &hash));
        assert!(!hasher.verify("4822", &hash));
        assert!(!hasher.verify("4821", "not-a-phc-string"));
    }

    #[test]
    fn test_token_extraction() {
        assert_eq!(extract_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
        assert_eq!(
            extract_session_cookie("theme=dark; sgir_session=tok; lang=es"),
            Some("tok")
        );
        assert_eq!(extract_session_cookie("theme=dark"), None);
    }
}
