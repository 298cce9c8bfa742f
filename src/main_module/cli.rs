use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use diesel::sql_types::Text;

use crate::config::{AppConfig, ENV_PREFIX};
use crate::core::shared::schema::users;
use crate::core::shared::utils::{create_conn, run_migrations, DbPool};
use crate::security::{generate_token, CryptoManager};

use super::run_server;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve,
    SetAdmin(String),
    CheckDb,
    Encrypt(String),
    GenerateEnv,
    Help,
}

impl Command {
    /// Parses the arguments after the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some(command) = args.first() else {
            return Ok(Self::Serve);
        };
        let operand = |usage: &str| -> Result<String> {
            match args.get(1) {
                Some(value) if !value.trim().is_empty() => Ok(value.clone()),
                _ => bail!("Usage: chamados {usage}"),
            }
        };

        match command.as_str() {
            "serve" => Ok(Self::Serve),
            "set-admin" => Ok(Self::SetAdmin(operand("set-admin <email>")?)),
            "check-db" => Ok(Self::CheckDb),
            "encrypt" => Ok(Self::Encrypt(operand("encrypt <value>")?)),
            "generate-env" => Ok(Self::GenerateEnv),
            "--help" | "-h" | "help" => Ok(Self::Help),
            other => bail!("Unknown command: {other}\nRun 'chamados --help' for usage information"),
        }
    }
}

pub fn print_usage() {
    println!("chamados {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: chamados [command]");
    println!();
    println!("Commands:");
    println!("  serve               Start the HTTP server (default)");
    println!("  set-admin <email>   Grant administrator rights to a user");
    println!("  check-db            Apply migrations and print a database summary");
    println!("  encrypt <value>     Encrypt a credential for the configuration file");
    println!("  generate-env        Print a .env template with a fresh session secret");
    println!("  --help              Show this message");
}

fn open_database(config: &AppConfig) -> Result<DbPool> {
    let pool = create_conn(&config.database.url, config.database.pool_size)
        .with_context(|| format!("Failed to open database {}", config.database.url))?;
    run_migrations(&pool).map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(pool)
}

#[derive(QueryableByName)]
struct TableName {
    #[diesel(sql_type = Text)]
    name: String,
}

fn check_db(config: &AppConfig) -> Result<()> {
    let pool = open_database(config)?;
    let mut conn = pool.get()?;
    println!("Database: {}", config.database.url);

    let tables: Vec<TableName> = diesel::sql_query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .load(&mut conn)?;
    println!("\nTables:");
    for table in &tables {
        println!("- {}", table.name);
    }

    let total: i64 = users::table.count().get_result(&mut conn)?;
    println!("\nUsers: {total}");
    let sample: Vec<(i32, String, String, bool)> = users::table
        .order(users::id.asc())
        .select((users::id, users::name, users::email, users::is_admin))
        .limit(5)
        .load(&mut conn)?;
    for (id, name, email, is_admin) in sample {
        println!("ID: {id}, Name: {name}, Email: {email}, Admin: {is_admin}");
    }
    if total == 0 {
        println!("No users yet. Register one and run 'chamados set-admin <email>'.");
    }
    Ok(())
}

fn set_admin(config: &AppConfig, email: &str) -> Result<()> {
    let pool = open_database(config)?;
    let mut conn = pool.get()?;
    if crate::users::set_admin(&mut conn, email)? {
        println!("{email} is now an administrator");
        Ok(())
    } else {
        bail!("No user registered with email {email}")
    }
}

/// `.env` template written for this crate's configuration keys.
pub fn env_template(secret: &str) -> String {
    format!(
        "# Runtime
{p}ENVIRONMENT=development
{p}COMPANY_NAME=Helpdesk
{p}PUBLIC_URL=http://localhost:8080

# Server
{p}SERVER__HOST=0.0.0.0
{p}SERVER__PORT=8080

# Database
{p}DATABASE__URL=chamados.db

# Session
{p}SESSION__SECRET={secret}
{p}SESSION__LIFETIME_MINUTES=30

# Email (use 'chamados encrypt <value>' for secrets)
{p}EMAIL__SMTP_HOST=smtp.office365.com
{p}EMAIL__SMTP_PORT=587
{p}EMAIL__USERNAME=
{p}EMAIL__PASSWORD=
{p}EMAIL__EMAILJS_SERVICE_ID=
{p}EMAIL__EMAILJS_TEMPLATE_ID=
{p}EMAIL__EMAILJS_USER_ID=

RUST_LOG=chamados=info,tower_http=info
",
        p = ENV_PREFIX,
    )
}

pub async fn run(command: Command) -> Result<()> {
    match command {
        Command::Help => {
            print_usage();
            Ok(())
        }
        Command::GenerateEnv => {
            print!("{}", env_template(&generate_token(48)));
            Ok(())
        }
        Command::Encrypt(value) => {
            let config = AppConfig::load()?;
            let crypto = CryptoManager::load_or_create(&config.key_file)?;
            println!("{}", crypto.seal(&value)?);
            Ok(())
        }
        Command::SetAdmin(email) => set_admin(&AppConfig::load()?, &email),
        Command::CheckDb => check_db(&AppConfig::load()?),
        Command::Serve => run_server(AppConfig::load()?).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse(&[]).expect("parse"), Command::Serve);
        assert_eq!(
            Command::parse(&args(&["set-admin", "ana@example.com"])).expect("parse"),
            Command::SetAdmin("ana@example.com".into())
        );
        assert_eq!(Command::parse(&args(&["--help"])).expect("parse"), Command::Help);
        assert!(Command::parse(&args(&["set-admin"])).is_err());
        assert!(Command::parse(&args(&["frobnicate"])).is_err());
    }

    #[test]
    fn test_env_template_uses_prefix_and_secret() {
        let template = env_template("s3cret");
        assert!(template.contains("CHAMADOS_SESSION__SECRET=s3cret"));
        assert!(template.contains("CHAMADOS_DATABASE__URL="));
    }

    #[test]
    fn test_set_admin_requires_existing_user() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.database.url = dir.path().join("cli.db").to_string_lossy().to_string();
        assert!(set_admin(&config, "nobody@example.com").is_err());
        check_db(&config).expect("summary");
    }
}
