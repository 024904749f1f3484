pub mod prelude;

pub mod analyses;
pub mod chat_messages;
pub mod chat_sessions;
pub mod reports;
pub mod users;
