//! Process entry points split out of `main.rs`: CLI dispatch, the HTTP
//! server and its health route.

mod cli;
mod health;
mod server;
mod shutdown;

pub use cli::*;
pub use health::*;
pub use server::*;
pub use shutdown::*;
