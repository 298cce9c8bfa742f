pub mod api_router;
pub mod attachments;
pub mod config;
pub mod core;
pub mod email;
pub mod main_module;
pub mod notifications;
pub mod reports;
pub mod security;
pub mod tickets;
pub mod users;
pub mod web;
