pub mod accounts;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod security;
pub mod seeder;
pub mod store;

pub use accounts::{AccountService, Registration, Session, MIN_PASSWORD_LEN};
pub use config::{
    ConfigManager, DatabaseBackend, DatabaseConfig, LoggingConfig, SecretsConfig,
    SecurityConfig, ServerConfig, Settings,
};
pub use error::{DespachoError, Result};
pub use lifecycle::LifecycleManager;
pub use model::*;
pub use security::{
    AuthConfig, AuthContext, JwtManager, PasswordManager, SecurityError, SecurityEvent,
    SecurityLogger,
};
pub use seeder::DefaultContentSeeder;
pub use store::{MemoryStore, PgStore, SharedStore, Store, UnitOfWork};
