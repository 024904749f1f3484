use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatRole {
    #[sea_orm(string_value = "USER")]
    User,
    #[sea_orm(string_value = "ASSISTANT")]
    Assistant,
}

/// Append-only chat turns, ordered by creation time.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chat_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub session_id: String,
    pub role: ChatRole,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub created_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::chat_sessions::Entity",
        from = "Column::SessionId",
        to = "super::chat_sessions::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    ChatSessions,
}

impl Related<super::chat_sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ChatSessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
