//! Layered application configuration.
//!
//! Values come from built-in defaults, then an optional TOML file
//! (`chamados.toml`, or the path in `CHAMADOS_CONFIG`), then `CHAMADOS_*`
//! environment variables where `__` separates sections, e.g.
//! `CHAMADOS_EMAIL__SMTP_HOST=smtp.example.com`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "chamados.toml";
pub const ENV_PREFIX: &str = "CHAMADOS_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub company_name: String,
    /// Base URL used to build links in outgoing email.
    pub public_url: String,
    /// Accounts registering with one of these emails become administrators.
    pub admin_emails: Vec<String>,
    /// Key file for credential obfuscation.
    pub key_file: PathBuf,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub email: EmailConfig,
    pub uploads: UploadConfig,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// HMAC secret for session tokens. Empty means a random per-process secret.
    pub secret: String,
    pub lifetime_minutes: i64,
    pub secure_cookie: bool,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    /// Plain text or `enc:`-prefixed ciphertext.
    pub password: String,
    pub from_name: String,
    pub emailjs_url: String,
    pub emailjs_service_id: String,
    pub emailjs_template_id: String,
    pub emailjs_user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_size: usize,
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub api_per_second: u32,
    pub api_burst: u32,
    pub login_per_minute: u32,
    pub password_reset_per_hour: u32,
    /// Reverse proxies whose forwarding headers are believed.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            company_name: "Helpdesk".to_string(),
            public_url: "http://localhost:8080".to_string(),
            admin_emails: Vec::new(),
            key_file: PathBuf::from(".key"),
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "chamados.db".to_string(),
                pool_size: 8,
            },
            session: SessionConfig {
                secret: String::new(),
                lifetime_minutes: 30,
                secure_cookie: false,
            },
            email: EmailConfig {
                enabled: true,
                smtp_host: "smtp.office365.com".to_string(),
                smtp_port: 587,
                username: String::new(),
                password: String::new(),
                from_name: "Helpdesk".to_string(),
                emailjs_url: "https://api.emailjs.com/api/v1.0/email/send".to_string(),
                emailjs_service_id: String::new(),
                emailjs_template_id: String::new(),
                emailjs_user_id: String::new(),
            },
            uploads: UploadConfig {
                dir: PathBuf::from("uploads"),
                max_size: 16 * 1024 * 1024,
                allowed_extensions: [
                    "txt", "pdf", "png", "jpg", "jpeg", "gif", "doc", "docx", "xls", "xlsx", "zip",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            },
            rate_limit: RateLimitSettings {
                enabled: true,
                api_per_second: 50,
                api_burst: 100,
                login_per_minute: 10,
                password_reset_per_hour: 3,
                trusted_proxies: Vec::new(),
            },
        }
    }
}

impl AppConfig {
    /// Build the figment used by [`AppConfig::load`].
    pub fn figment() -> Figment {
        let file = std::env::var(format!("{ENV_PREFIX}CONFIG"))
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["CONFIG"]).split("__"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn is_bootstrap_admin(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|admin| admin.trim().eq_ignore_ascii_case(email.trim()))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("environment", &self.environment)
            .field("company_name", &self.company_name)
            .field("public_url", &self.public_url)
            .field("server", &self.server)
            .field("database", &self.database)
            .field("session", &"[REDACTED]")
            .field("email_host", &self.email.smtp_host)
            .field("uploads", &self.uploads)
            .field("rate_limit", &self.rate_limit)
            .finish_non_exhaustive()
    }
}
