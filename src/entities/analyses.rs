use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Persisted outcome of running the analyzer on a report.
///
/// `violations`, `suggestions` and `metadata` are JSON text blobs, serialized
/// at this storage edge only; everything upstream works with the typed value
/// objects in `crate::models`. `full_text` is retained as chat context.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "analyses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub report_id: String,
    pub structural_score: i32,
    pub formatting_score: i32,
    pub grammar_score: i32,
    pub overall_score: i32,
    #[sea_orm(column_type = "Text")]
    pub violations: String,
    #[sea_orm(column_type = "Text")]
    pub suggestions: String,
    #[sea_orm(column_type = "Text")]
    pub metadata: String,
    #[sea_orm(column_type = "Text")]
    pub full_text: String,
    pub created_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::reports::Entity",
        from = "Column::ReportId",
        to = "super::reports::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Reports,
}

impl Related<super::reports::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reports.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
