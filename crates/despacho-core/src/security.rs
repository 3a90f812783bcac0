use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{Settings, MIN_JWT_SECRET_LEN};

#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("Token no proporcionado")]
    MissingToken,
    #[error("Token expirado")]
    ExpiredToken,
    #[error("Token inválido")]
    InvalidToken,
    #[error("Token generation failed: {0}")]
    TokenGeneration(String),
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("Cryptographic operation failed: {0}")]
    CryptographicFailure(String),
}

/// Identity carried by a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
    pub jwt_expiry_hours: u64,
}

impl AuthConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, SecurityError> {
        let jwt_secret = settings
            .jwt_secret()
            .ok_or_else(|| SecurityError::KeyDerivation("jwt secret not configured".to_string()))?;

        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(SecurityError::KeyDerivation(format!(
                "jwt secret must be at least {MIN_JWT_SECRET_LEN} characters"
            )));
        }

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret.to_string()),
            jwt_expiry_hours: settings.security.jwt_expiry_hours,
        })
    }

    pub fn jwt_secret(&self) -> &str {
        self.jwt_secret.expose_secret()
    }
}

/// HS256 session tokens.
pub struct JwtManager {
    config: AuthConfig,
}

impl JwtManager {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String, SecurityError> {
        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::hours(self.config.jwt_expiry_hours as i64);
        self.create_token(&AuthContext {
            user_id,
            email: email.to_string(),
            issued_at,
            expires_at,
        })
    }

    pub fn create_token(&self, auth_context: &AuthContext) -> Result<String, SecurityError> {
        let claims = Claims {
            sub: auth_context.user_id.to_string(),
            email: auth_context.email.clone(),
            iat: auth_context.issued_at.timestamp(),
            exp: auth_context.expires_at.timestamp(),
        };

        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(self.config.jwt_secret().as_bytes());

        encode(&header, &claims, &key).map_err(|e| SecurityError::TokenGeneration(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<AuthContext, SecurityError> {
        let key = DecodingKey::from_secret(self.config.jwt_secret().as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => SecurityError::ExpiredToken,
            _ => SecurityError::InvalidToken,
        })?;

        let claims = token_data.claims;
        Ok(AuthContext {
            user_id: Uuid::parse_str(&claims.sub).map_err(|_| SecurityError::InvalidToken)?,
            email: claims.email,
            issued_at: DateTime::from_timestamp(claims.iat, 0).unwrap_or_default(),
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or_default(),
        })
    }
}

/// Argon2id password hashing with a fresh salt per password.
#[derive(Clone, Default)]
pub struct PasswordManager {
    argon2: Argon2<'static>,
}

impl PasswordManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash(&self, password: &str) -> Result<String, SecurityError> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| SecurityError::CryptographicFailure(e.to_string()))?;

        Ok(password_hash.to_string())
    }

    /// Constant-time check of `password` against a stored PHC string.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, SecurityError> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| SecurityError::CryptographicFailure(e.to_string()))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}

/// Security event logging
#[derive(Debug, Clone)]
pub enum SecurityEvent {
    AuthenticationFailure {
        email: String,
        reason: String,
    },
    AuthenticationSuccess {
        user_id: Uuid,
        method: String,
    },
    PasswordChanged {
        user_id: Uuid,
        method: String,
    },
    PermissionDenied {
        user_id: Uuid,
        resource: String,
    },
    AdminAccess {
        user_id: Uuid,
        action: String,
        resource: String,
    },
}

pub struct SecurityLogger;

impl SecurityLogger {
    pub fn log_event(event: SecurityEvent) {
        use tracing::{info, warn};

        match event {
            SecurityEvent::AuthenticationFailure { email, reason } => {
                warn!(email = %email, reason = %reason, "Authentication failure");
            }
            SecurityEvent::AuthenticationSuccess { user_id, method } => {
                info!(user_id = %user_id, method = %method, "Authentication success");
            }
            SecurityEvent::PasswordChanged { user_id, method } => {
                info!(user_id = %user_id, method = %method, "Password changed");
            }
            SecurityEvent::PermissionDenied { user_id, resource } => {
                warn!(user_id = %user_id, resource = %resource, "Permission denied");
            }
            SecurityEvent::AdminAccess {
                user_id,
                action,
                resource,
            } => {
                info!(
                    user_id = %user_id,
                    action = %action,
                    resource = %resource,
                    "Admin access"
                );
            }
        }
    }
}
