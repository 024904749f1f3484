pub mod analyze;
pub mod auth;
pub mod chat;
pub mod reports;
