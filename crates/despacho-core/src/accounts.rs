//! Registration, login and password management.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DespachoError, Result};
use crate::model::{normalize_email, PublicUser, SeedReport, UserRecord};
use crate::security::{JwtManager, PasswordManager, SecurityEvent, SecurityLogger};
use crate::seeder::DefaultContentSeeder;
use crate::store::SharedStore;

pub const MIN_PASSWORD_LEN: usize = 6;

const INVALID_CREDENTIALS: &str = "Credenciales incorrectas";

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub usuario: PublicUser,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub usuario: PublicUser,
    pub token: String,
    /// `None` when seeding failed; the account exists either way.
    pub sembrado: Option<SeedReport>,
}

pub struct AccountService {
    store: SharedStore,
    passwords: PasswordManager,
    jwt: Arc<JwtManager>,
    seeder: Arc<DefaultContentSeeder>,
}

impl AccountService {
    pub fn new(store: SharedStore, jwt: Arc<JwtManager>, seeder: Arc<DefaultContentSeeder>) -> Self {
        Self {
            store,
            passwords: PasswordManager::new(),
            jwt,
            seeder,
        }
    }

    pub async fn register(&self, nombre: &str, email: &str, password: &str) -> Result<Registration> {
        let nombre = nombre.trim();
        let email = normalize_email(email);
        if nombre.is_empty() || email.is_empty() || password.is_empty() {
            return Err(DespachoError::bad_request(
                "Nombre, correo y contraseña son obligatorios",
            ));
        }
        validate_password(password)?;

        let password_hash = self.hash_password(password).await?;
        let user = UserRecord {
            id: Uuid::new_v4(),
            nombre: nombre.to_string(),
            email,
            password_hash,
            creado_en: Utc::now(),
        };

        let mut uow = self.store.begin().await?;
        if uow.find_user_by_email(&user.email).await?.is_some() {
            return Err(DespachoError::bad_request("El correo ya está registrado"));
        }
        uow.insert_user(&user).await.map_err(|err| match err {
            DespachoError::Conflict(_) => DespachoError::bad_request("El correo ya está registrado"),
            other => other,
        })?;
        uow.commit().await?;
        info!(usuario_id = %user.id, "User registered");

        let sembrado = match self.seeder.seed_user_defaults(user.id).await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(usuario_id = %user.id, error = %err, "Default seeding failed; account kept");
                None
            }
        };

        let token = self.jwt.issue(user.id, &user.email)?;
        Ok(Registration {
            usuario: PublicUser::from(&user),
            token,
            sembrado,
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let email = normalize_email(email);
        let mut uow = self.store.begin().await?;
        let user = uow.find_user_by_email(&email).await?;
        drop(uow);

        let Some(user) = user else {
            SecurityLogger::log_event(SecurityEvent::AuthenticationFailure {
                email,
                reason: "unknown email".to_string(),
            });
            return Err(DespachoError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        if !self.verify_password(password, &user.password_hash).await? {
            SecurityLogger::log_event(SecurityEvent::AuthenticationFailure {
                email,
                reason: "wrong password".to_string(),
            });
            return Err(DespachoError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        SecurityLogger::log_event(SecurityEvent::AuthenticationSuccess {
            user_id: user.id,
            method: "password".to_string(),
        });
        let token = self.jwt.issue(user.id, &user.email)?;
        Ok(Session {
            usuario: PublicUser::from(&user),
            token,
        })
    }

    pub async fn change_password(&self, usuario_id: Uuid, actual: &str, nueva: &str) -> Result<()> {
        validate_password(nueva)?;

        let mut uow = self.store.begin().await?;
        let user = uow
            .find_user(usuario_id)
            .await?
            .ok_or_else(|| DespachoError::NotFound("Usuario no encontrado".to_string()))?;

        if !self.verify_password(actual, &user.password_hash).await? {
            SecurityLogger::log_event(SecurityEvent::AuthenticationFailure {
                email: user.email,
                reason: "wrong current password".to_string(),
            });
            return Err(DespachoError::Unauthorized(
                "La contraseña actual es incorrecta".to_string(),
            ));
        }

        let hash = self.hash_password(nueva).await?;
        uow.update_password_hash(user.id, &hash).await?;
        uow.commit().await?;

        SecurityLogger::log_event(SecurityEvent::PasswordChanged {
            user_id: user.id,
            method: "change".to_string(),
        });
        Ok(())
    }

    /// Resets the password of the account registered under `email`.
    pub async fn recover_password(&self, email: &str, nueva: &str) -> Result<()> {
        validate_password(nueva)?;
        let email = normalize_email(email);

        let mut uow = self.store.begin().await?;
        let user = uow
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| DespachoError::NotFound("Correo no registrado".to_string()))?;

        let hash = self.hash_password(nueva).await?;
        uow.update_password_hash(user.id, &hash).await?;
        uow.commit().await?;

        SecurityLogger::log_event(SecurityEvent::PasswordChanged {
            user_id: user.id,
            method: "recovery".to_string(),
        });
        Ok(())
    }

    // Argon2 is CPU-bound; keep it off the async workers.
    async fn hash_password(&self, password: &str) -> Result<String> {
        let passwords = self.passwords.clone();
        let password = password.to_owned();
        let hash = tokio::task::spawn_blocking(move || passwords.hash(&password))
            .await
            .map_err(|err| DespachoError::Internal(format!("password hashing task failed: {err}")))??;
        Ok(hash)
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let passwords = self.passwords.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();
        let matches = tokio::task::spawn_blocking(move || passwords.verify(&password, &hash))
            .await
            .map_err(|err| {
                DespachoError::Internal(format!("password verification task failed: {err}"))
            })??;
        Ok(matches)
    }
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DespachoError::bad_request(format!(
            "La contraseña debe tener al menos {MIN_PASSWORD_LEN} caracteres"
        )));
    }
    Ok(())
}
