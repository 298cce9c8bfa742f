pub mod enums;
pub mod models;
pub mod schema;
pub mod state;
#[cfg(test)]
pub mod test_utils;
pub mod utils;

pub use enums::*;

pub use models::{
    Attachment, NewAttachment, NewNotification, NewResponse, NewTicket, NewUser, Notification,
    Response, ResponseView, Ticket, TicketDetail, User,
};

pub use state::{AppState, DbConn};

pub use utils::{create_conn, format_timestamp, now, run_migrations, sanitize_filename, DbPool};
