pub use super::analyses::Entity as Analyses;
pub use super::chat_messages::Entity as ChatMessages;
pub use super::chat_sessions::Entity as ChatSessions;
pub use super::reports::Entity as Reports;
pub use super::users::Entity as Users;
