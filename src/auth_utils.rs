// taskboard-api/src/auth_utils.rs
use crate::error_handler::ServiceError;
use actix_web::http::header;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use futures_util::future::{err, ok, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use uuid::Uuid;

/// Signing key and token lifetime, read once at startup and shared through
/// `web::Data`.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub secret: String,
    pub token_ttl_seconds: i64,
}

impl AuthSettings {
    pub fn from_env() -> Self {
        let secret = env::var("SECRET_KEY")
            .expect("SECRET_KEY must be set in environment variables or .env file");
        let token_ttl_seconds = env::var("TOKEN_TTL_SECONDS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse::<i64>()
            .expect("TOKEN_TTL_SECONDS must be a valid number");
        AuthSettings {
            secret,
            token_ttl_seconds,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct Claims {
    sub: Uuid,
    exp: i64,
}

pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            log::error!("Password hashing failed: {}", e);
            ServiceError::InternalServerError("Could not hash password.".to_string())
        })
}

/// A malformed stored hash verifies as false rather than erroring, so login
/// behaves identically for bad passwords and corrupt credentials.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn issue_token(user_id: Uuid, settings: &AuthSettings) -> Result<String, ServiceError> {
    let claims = Claims {
        sub: user_id,
        exp: Utc::now().timestamp() + settings.token_ttl_seconds,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.secret.as_bytes()),
    )
    .map_err(|e| {
        log::error!("Token encoding failed: {}", e);
        ServiceError::InternalServerError("Could not issue token.".to_string())
    })
}

/// Bad signature, malformed structure and past expiry all collapse to `None`.
pub fn verify_token(token: &str, settings: &AuthSettings) -> Option<Uuid> {
    let mut validation = Validation::default();
    validation.leeway = 0;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims.sub)
    .ok()
}

pub fn extract_bearer_token(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ")
}

#[derive(Debug)]
pub struct AuthenticatedUser {
    pub id: Uuid,
}

impl FromRequest for AuthenticatedUser {
    type Error = ServiceError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(settings) = req.app_data::<web::Data<AuthSettings>>() else {
            log::error!("AuthSettings missing from app data");
            return err(ServiceError::InternalServerError(
                "Authentication is not configured.".to_string(),
            ));
        };

        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(extract_bearer_token);

        // Missing header, wrong scheme, bad signature and expiry all answer
        // the same way; the reason is not disclosed to the caller.
        match token.and_then(|t| verify_token(t, settings)) {
            Some(user_id) => {
                log::debug!("Authenticated request for user {}", user_id);
                ok(AuthenticatedUser { id: user_id })
            }
            None => err(ServiceError::Unauthorized("Not authenticated.".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings(ttl: i64) -> AuthSettings {
        AuthSettings {
            secret: "test-secret-key-for-unit-tests-only".to_string(),
            token_ttl_seconds: ttl,
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter2hunter2").expect("hashing failed");
        assert!(verify_password("hunter2hunter2", &hash));
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same-password").expect("hashing failed");
        let b = hash_password("same-password").expect("hashing failed");
        assert_ne!(a, b);
    }

    #[test]
    fn corrupt_stored_hash_verifies_false() {
        assert!(!verify_password("whatever", "not-a-phc-string"));
        assert!(!verify_password("whatever", ""));
    }

    #[test]
    fn token_round_trip() {
        let settings = test_settings(3600);
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id, &settings).expect("issue failed");
        assert_eq!(verify_token(&token, &settings), Some(user_id));
    }

    #[test]
    fn expired_token_is_invalid() {
        let settings = test_settings(-10);
        let token = issue_token(Uuid::new_v4(), &settings).expect("issue failed");
        assert_eq!(verify_token(&token, &settings), None);
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let settings = test_settings(3600);
        let other = AuthSettings {
            secret: "a-different-secret-entirely-here".to_string(),
            token_ttl_seconds: 3600,
        };
        let token = issue_token(Uuid::new_v4(), &other).expect("issue failed");
        assert_eq!(verify_token(&token, &settings), None);
    }

    #[test]
    fn malformed_token_is_invalid() {
        let settings = test_settings(3600);
        assert_eq!(verify_token("not.a.jwt", &settings), None);
        assert_eq!(verify_token("", &settings), None);
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("Basic abc123"), None);
        assert_eq!(extract_bearer_token("abc123"), None);
    }
}
