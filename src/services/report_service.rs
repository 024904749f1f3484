use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::models::{AnalysisMetadata, DocumentFindings};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

/// File metadata captured at upload time.
pub struct UploadMeta {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

pub struct SavedAnalysis {
    pub report: reports::Model,
    pub analysis: analyses::Model,
}

/// Persists reports and their analyses. A report row and its analysis row are
/// only ever created together, in one transaction.
pub struct ReportService {
    db: DatabaseConnection,
}

impl ReportService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create the report and its one-to-one analysis atomically.
    ///
    /// Status derivation: `FAILED` iff the findings carry an error, otherwise
    /// `COMPLETED`. No dedup is performed; resubmitting the same file creates
    /// a fresh report.
    pub async fn save_analysis(
        &self,
        user_id: &str,
        meta: UploadMeta,
        findings: &DocumentFindings,
        overall_score: i32,
        full_text: &str,
    ) -> Result<SavedAnalysis, AppError> {
        let status = if findings.error.is_some() {
            reports::ReportStatus::Failed
        } else {
            reports::ReportStatus::Completed
        };

        let metadata = AnalysisMetadata {
            word_count: full_text.split_whitespace().count(),
            clarity: findings.clarity,
        };

        let violations = serde_json::to_string(&findings.issues)
            .map_err(|e| AppError::Internal(format!("Failed to serialize issues: {}", e)))?;
        let suggestions = serde_json::to_string(&findings.suggestion_texts())
            .map_err(|e| AppError::Internal(format!("Failed to serialize suggestions: {}", e)))?;
        let metadata = serde_json::to_string(&metadata)
            .map_err(|e| AppError::Internal(format!("Failed to serialize metadata: {}", e)))?;

        let txn = self.db.begin().await?;

        let report = reports::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            filename: Set(meta.filename),
            mime_type: Set(meta.mime_type),
            size_bytes: Set(meta.size_bytes),
            status: Set(status),
            is_archived: Set(false),
            uploaded_at: Set(Some(Utc::now())),
        }
        .insert(&txn)
        .await?;

        let analysis = analyses::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            report_id: Set(report.id.clone()),
            structural_score: Set(findings.structural_score),
            formatting_score: Set(findings.formatting_score),
            grammar_score: Set(findings.grammar_score),
            overall_score: Set(overall_score),
            violations: Set(violations),
            suggestions: Set(suggestions),
            metadata: Set(metadata),
            full_text: Set(full_text.to_string()),
            created_at: Set(Some(Utc::now())),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        Ok(SavedAnalysis { report, analysis })
    }

    /// Ten most recent reports owned by the user, with their analysis.
    pub async fn list_recent(
        &self,
        user_id: &str,
        archived: bool,
    ) -> Result<Vec<(reports::Model, Option<analyses::Model>)>, AppError> {
        let rows = Reports::find()
            .find_also_related(Analyses)
            .filter(reports::Column::UserId.eq(user_id))
            .filter(reports::Column::IsArchived.eq(archived))
            .order_by_desc(reports::Column::UploadedAt)
            .limit(10)
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    /// Toggle the archive flag, scoped to the owning user.
    pub async fn set_archived(
        &self,
        user_id: &str,
        report_id: &str,
        archived: bool,
    ) -> Result<reports::Model, AppError> {
        let report = Reports::find_by_id(report_id)
            .filter(reports::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Report not found".to_string()))?;

        let mut active: reports::ActiveModel = report.into();
        active.is_archived = Set(archived);
        let updated = active.update(&self.db).await?;
        Ok(updated)
    }
}
