use diesel::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::AppConfig;
use crate::core::shared::enums::{Criticality, TicketStatus};
use crate::core::shared::models::{NewTicket, NewUser, Ticket, User};
use crate::core::shared::schema::{tickets, users};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{create_conn, now, run_migrations};
use crate::email::{EmailService, SimulatedTransport};
use crate::security::{Argon2Config, PasswordService};

pub const TEST_PASSWORD: &str = "password123";

pub struct TestContext {
    pub state: Arc<AppState>,
    pub mail: Arc<SimulatedTransport>,
    pub dir: TempDir,
}

pub fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = dir.path().join("test.db").to_string_lossy().to_string();
    config.database.pool_size = 4;
    config.key_file = dir.path().join(".key");
    config.uploads.dir = dir.path().join("uploads");
    config.session.secret = "test-session-secret".to_string();
    config.company_name = "ACME".to_string();
    config.rate_limit.api_per_second = 10_000;
    config.rate_limit.api_burst = 10_000;
    config
}

pub fn test_context() -> TestContext {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(&dir);
    let pool = create_conn(&config.database.url, config.database.pool_size).expect("pool");
    run_migrations(&pool).expect("migrations");
    let mail = Arc::new(SimulatedTransport::new());
    let email = EmailService::new(vec![mail.clone()]);
    let passwords = PasswordService::new(&Argon2Config::minimal()).expect("hasher");
    let state = Arc::new(AppState::from_parts(config, pool, passwords, email));
    TestContext { state, mail, dir }
}

pub fn insert_user(state: &AppState, name: &str, email: &str, is_admin: bool) -> User {
    let mut conn = state.conn.get().expect("conn");
    let hash = state.passwords.hash(TEST_PASSWORD).expect("hash");
    diesel::insert_into(users::table)
        .values(&NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: hash,
            is_admin,
            created_at: now(),
        })
        .returning(User::as_returning())
        .get_result(&mut conn)
        .expect("insert user")
}

pub fn insert_ticket(state: &AppState, author_id: i32, title: &str, description: &str) -> Ticket {
    let mut conn = state.conn.get().expect("conn");
    diesel::insert_into(tickets::table)
        .values(&NewTicket {
            title: title.to_string(),
            description: description.to_string(),
            status: TicketStatus::Open,
            criticality: Criticality::Medium,
            created_at: now(),
            author_id,
        })
        .returning(Ticket::as_returning())
        .get_result(&mut conn)
        .expect("insert ticket")
}
