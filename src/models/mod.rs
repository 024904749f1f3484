use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Severity of a single compliance finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// Category tag for a finding. The model is asked for a fixed vocabulary, but
/// anything it invents beyond that degrades to `Other` instead of failing the
/// whole decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Grammar,
    Structure,
    Formatting,
    SyntacticProtocol,
    Alignment,
    MissingSection,
    /// Synthetic issue emitted by the pipeline itself when analysis fails.
    System,
    #[serde(other)]
    Other,
}

/// One discrete compliance finding with its suggested fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    /// Approximate page, as estimated by the model from text flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    pub description: String,
    pub suggestion: String,
    pub severity: Severity,
    /// Underlying failure message, present only on the pipeline-synthesized
    /// `system` issue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Structured result of analyzing one document.
///
/// `error` is set only on the non-quota failure path; the persistence layer
/// maps it to a `FAILED` report status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DocumentFindings {
    pub structural_score: i32,
    pub formatting_score: i32,
    pub grammar_score: i32,
    pub issues: Vec<Issue>,
    pub tone: String,
    pub clarity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentFindings {
    /// Suggestion texts, in issue order. Stored in the `suggestions` column.
    pub fn suggestion_texts(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.suggestion.clone()).collect()
    }
}

/// Derived metrics persisted alongside the scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisMetadata {
    pub word_count: usize,
    pub clarity: i32,
}
