use anyhow::Context;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::SqliteConnection;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::core::error::AppResult;
use crate::core::rate_limit::RateLimitState;
use crate::email::EmailService;
use crate::security::{Argon2Config, CryptoManager, PasswordService};
use crate::web::auth::AuthConfig;

use super::utils::{create_conn, run_migrations, DbPool};

pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

pub struct AppState {
    pub conn: DbPool,
    pub config: Arc<AppConfig>,
    pub auth: AuthConfig,
    pub passwords: PasswordService,
    pub email: Arc<EmailService>,
    pub rate_limits: Arc<RateLimitState>,
}

impl AppState {
    /// Opens the database, applies migrations and wires every service from
    /// configuration.
    pub fn build(config: AppConfig) -> anyhow::Result<Self> {
        let pool = create_conn(&config.database.url, config.database.pool_size)
            .with_context(|| format!("Failed to open database {}", config.database.url))?;
        run_migrations(&pool).map_err(|e| anyhow::anyhow!("{e}"))?;
        info!("Database ready at {}", config.database.url);

        let crypto = CryptoManager::load_or_create(&config.key_file)?;
        let email = EmailService::from_config(&config, &crypto)?;
        let passwords = PasswordService::new(&Argon2Config::default())?;

        Ok(Self::from_parts(config, pool, passwords, email))
    }

    pub fn from_parts(
        config: AppConfig,
        pool: DbPool,
        passwords: PasswordService,
        email: EmailService,
    ) -> Self {
        let auth = AuthConfig::from_config(&config.session);
        let rate_limits = Arc::new(RateLimitState::new(&config.rate_limit));
        Self {
            conn: pool,
            config: Arc::new(config),
            auth,
            passwords,
            email: Arc::new(email),
            rate_limits,
        }
    }

    pub fn db(&self) -> AppResult<DbConn> {
        Ok(self.conn.get()?)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("conn", &"DbPool")
            .field("auth", &"[REDACTED]")
            .field("passwords", &self.passwords)
            .field("email", &self.email)
            .field("rate_limits", &self.rate_limits)
            .finish()
    }
}
