use crate::config::AppConfig;
use crate::models::{DocumentFindings, Issue, IssueKind, Severity};
use crate::services::ai::{strip_code_fence, AiClient, AiError, AiErrorKind};
use crate::utils::truncate_chars;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Runs the rulebook prompt against the AI model and normalizes the outcome.
///
/// `analyze` never fails: quota exhaustion degrades to a canned payload, any
/// other failure degrades to a zero-score result whose `error` field the
/// persistence layer maps to a `FAILED` report.
pub struct AnalysisService {
    ai: Arc<dyn AiClient>,
    config: AppConfig,
}

/// Reply schema the model is instructed to produce. Decoded strictly with
/// serde; a reply that does not match is a fatal `InvalidResponse`, not
/// something to salvage by brace-scanning.
#[derive(Debug, Deserialize)]
struct AnalysisReply {
    #[serde(default)]
    structural_score: i32,
    #[serde(default)]
    formatting_score: i32,
    /// Grammar sub-score; the upstream schema calls this plain "score".
    #[serde(default)]
    score: i32,
    #[serde(default)]
    issues: Vec<Issue>,
    #[serde(default = "unknown_tone")]
    tone: String,
    #[serde(default)]
    clarity: i32,
}

fn unknown_tone() -> String {
    "unknown".to_string()
}

impl AnalysisService {
    pub fn new(ai: Arc<dyn AiClient>, config: AppConfig) -> Self {
        Self { ai, config }
    }

    /// Analyze extracted report text. Blocking backoff sleeps are scoped to
    /// the single request being served.
    pub async fn analyze(&self, text: &str) -> DocumentFindings {
        let prompt = build_analysis_prompt(truncate_chars(text, self.config.analysis_char_window));

        let mut retries_left = self.config.ai_max_retries;
        let mut delay = Duration::from_millis(self.config.ai_retry_base_ms);

        let outcome = loop {
            match self.ai.generate(&prompt).await {
                Ok(raw) => break Ok(raw),
                Err(err) if err.kind == AiErrorKind::RateLimited && retries_left > 0 => {
                    tracing::warn!(
                        retries_left,
                        delay_ms = delay.as_millis() as u64,
                        "AI quota reached, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(1.5);
                    retries_left -= 1;
                }
                Err(err) => break Err(err),
            }
        };

        match outcome {
            Ok(raw) => match parse_findings(&raw) {
                Ok(findings) => findings,
                Err(err) => {
                    tracing::error!("AI reply failed strict decode: {}", err);
                    failure_findings(&err.message)
                }
            },
            Err(err) if err.kind == AiErrorKind::RateLimited => {
                tracing::warn!(
                    "AI quota exhausted after {} retries, serving canned fallback findings",
                    self.config.ai_max_retries
                );
                quota_fallback_findings()
            }
            Err(err) => {
                tracing::error!("AI analysis failed: {}", err);
                failure_findings(&err.message)
            }
        }
    }
}

/// Decode a raw model reply into findings.
fn parse_findings(raw: &str) -> Result<DocumentFindings, AiError> {
    let cleaned = strip_code_fence(raw);
    let reply: AnalysisReply = serde_json::from_str(cleaned).map_err(|e| {
        AiError::invalid_response(format!("AI response format invalid: {}", e))
    })?;

    Ok(DocumentFindings {
        structural_score: reply.structural_score,
        formatting_score: reply.formatting_score,
        grammar_score: reply.score,
        issues: reply.issues,
        tone: reply.tone,
        clarity: reply.clarity,
        error: None,
    })
}

/// Zero-score result for non-quota failures. Exactly one synthetic `system`
/// issue carries the underlying message; the `error` field marks the report
/// as failed downstream.
fn failure_findings(message: &str) -> DocumentFindings {
    DocumentFindings {
        structural_score: 0,
        formatting_score: 0,
        grammar_score: 0,
        issues: vec![Issue {
            kind: IssueKind::System,
            page: None,
            description: "AI analysis failed.".to_string(),
            suggestion: "Please check your API key and server logs.".to_string(),
            severity: Severity::Critical,
            error: Some(message.to_string()),
        }],
        tone: "unknown".to_string(),
        clarity: 0,
        error: Some(message.to_string()),
    }
}

fn issue(
    kind: IssueKind,
    page: &str,
    description: &str,
    suggestion: &str,
    severity: Severity,
) -> Issue {
    Issue {
        kind,
        page: Some(page.to_string()),
        description: description.to_string(),
        suggestion: suggestion.to_string(),
        severity,
        error: None,
    }
}

/// Hand-authored result served when the upstream quota stays exhausted past
/// the retry budget. Keeps the user-facing flow alive during outages instead
/// of hard-failing; the trade-off is that the data is not live.
pub fn quota_fallback_findings() -> DocumentFindings {
    use IssueKind::*;
    use Severity::*;

    DocumentFindings {
        structural_score: 65,
        formatting_score: 72,
        grammar_score: 68,
        issues: vec![
            issue(
                Structure,
                "1",
                "Cover Page & Title Page: Does not strictly follow the specific AU template.",
                "Ensure the Cover Page contains the Title, Name, College Logo, Department, Month & Year in exact AU proportions.",
                Critical,
            ),
            issue(
                Formatting,
                "2",
                "Bonafide Certificate: Formatting violation detected on the certificate page.",
                "Must be signed by your Guide and HOD. Format exclusively in Font: Times New Roman, Size 14, Double Spaced.",
                Critical,
            ),
            issue(
                MissingSection,
                "3",
                "Declaration: Signed declaration by the student(s) was not detected.",
                "Insert a Declaration page immediately following the Bonafide Certificate, signed by all participating students.",
                High,
            ),
            issue(
                MissingSection,
                "4",
                "Acknowledgement: A brief thank you to the college, department, and guides is completely missing.",
                "Add a brief but formal acknowledgement section.",
                Medium,
            ),
            issue(
                Structure,
                "5",
                "Abstract: The abstract either exceeds the one-page limit or falls short of the word count.",
                "Rewrite the Abstract to be a concise one-page summary of your project (strictly between 300-500 words).",
                High,
            ),
            issue(
                Formatting,
                "6",
                "Table of Contents: The heading hierarchies do not match AU protocols.",
                "Generate a detailed list of chapters and sub-sections with precise 1.5 spacing and leader dots.",
                High,
            ),
            issue(
                MissingSection,
                "7",
                "List of Tables: Missing from the initial Roman numeral pages.",
                "List all tables with exact page numbers immediately after the TOC.",
                Medium,
            ),
            issue(
                MissingSection,
                "8",
                "List of Figures: Figures are present in the document but unlisted.",
                "List all charts, diagrams, and photos meticulously.",
                Medium,
            ),
            issue(
                Structure,
                "9",
                "List of Symbols & Abbreviations: Technical terms used without upfront definitions.",
                "Define technical terms or math symbols used in a dedicated List of Symbols.",
                Low,
            ),
            issue(
                SyntacticProtocol,
                "12",
                "First-Person Pronoun Violation: Detected the use of 'We' and 'Our' in the Introduction.",
                "Anna University protocol requires strictly third-person voice. Rewrite to remove all first-person pronouns.",
                Critical,
            ),
            issue(
                Grammar,
                "15",
                "Contractions Detected: Formal academic writing prohibits contractions like 'don't' or 'can't'.",
                "Expand all contractions into their full word forms (e.g., 'do not').",
                High,
            ),
            issue(
                SyntacticProtocol,
                "22",
                "Passive Voice Misuse: Passive voice detected outside of the Methodology section.",
                "Use active voice strictly for the Discussion and Conclusion sections to assert findings.",
                High,
            ),
            issue(
                Formatting,
                "25",
                "Alignment Error: Body text was found to be left-aligned instead of Justified.",
                "Highlight the body text and apply full Justification alignment (Ctrl+J).",
                Critical,
            ),
            issue(
                SyntacticProtocol,
                "30",
                "Nominalization Trap: Detected weak verb usage coupled with static nouns ('conducted an investigation').",
                "Switch to active verbs (e.g., change 'conducted an investigation' to 'investigated').",
                Medium,
            ),
            issue(
                Formatting,
                "35",
                "Equation Formatting: Equation not numbered correctly.",
                "Equations must be centered with Arabic numbering enclosed in parentheses flush to the right margin.",
                Medium,
            ),
        ],
        tone: "inconsistent".to_string(),
        clarity: 60,
        error: None,
    }
}

/// Fixed instruction prompt encoding the Anna University 2026 report protocol.
fn build_analysis_prompt(text: &str) -> String {
    format!(
        r#"ROLE: You are the "Academic Architect," a specialized AI engine designed to generate and audit project reports for Anna University students (2026 cycle). You must adhere to every rule below with 100% fidelity.

Analyze the accompanying text according to the Anna University 2026 Academic Report Protocol.

1. PAGE NUMBERS: Try to approximate the page number of the error based on text flow, assign this to the "page" field.
2. STRUCTURE AUDIT: Verify the presence, formatting, and order of these exact sections:
    - Cover Page & Title Page (Title, Name, College Logo, Department, Month & Year)
    - Bonafide Certificate (Signed by Guide and HOD. Times New Roman, 14pt, Double Spaced)
    - Declaration (Signed by student)
    - Acknowledgement (Brief thank you)
    - Abstract (One page summary, 300-500 words)
    - Table of Contents
    - List of Tables
    - List of Figures
    - List of Symbols & Abbreviations
3. SYNTACTIC PROTOCOL:
    - Strictly Third Person (Flag I, We, My, You as CRITICAL).
    - No Contractions.
    - Passive Voice exclusively for Methodology, Active Voice for Discussion/Conclusions.
    - Eliminate Nominalization (Static Nouns + Weak Verbs).
4. FORMATTING PROTOCOL:
    - Identify any obvious formatting violations from the scanned text.

CRITICAL REQUIREMENT: You MUST provide an EXHAUSTIVE list of every single issue found. Aim for 20+ issues if the document is flawed. Do not stop analyzing early. Read the entire document.

Return ONLY valid JSON. Do not include markdown formatting.
Response structure:
{{
  "structural_score": number (0-100),
  "formatting_score": number (0-100),
  "score": number (0-100),
  "issues": [
    {{
      "type": "grammar" | "structure" | "formatting" | "syntactic_protocol" | "alignment" | "missing_section",
      "page": "page number (e.g. 1, 4)",
      "description": "description",
      "suggestion": "suggestion",
      "severity": "critical" | "high" | "medium" | "low"
    }}
  ],
  "tone": "formal" | "casual",
  "clarity": number (0-100)
}}

Text to analyze:
{}"#,
        text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai::{ChatTurn, StaticClient};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> AppConfig {
        AppConfig {
            ai_retry_base_ms: 1,
            ..AppConfig::default()
        }
    }

    struct FailingClient {
        kind: AiErrorKind,
        message: &'static str,
        calls: AtomicU32,
    }

    impl FailingClient {
        fn new(kind: AiErrorKind, message: &'static str) -> Self {
            Self {
                kind,
                message,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl AiClient for FailingClient {
        async fn generate(&self, _prompt: &str) -> Result<String, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AiError {
                kind: self.kind,
                message: self.message.to_string(),
            })
        }

        async fn chat(&self, _turns: &[ChatTurn]) -> Result<String, AiError> {
            Err(AiError {
                kind: self.kind,
                message: self.message.to_string(),
            })
        }
    }

    struct CannedClient(&'static str);

    #[async_trait]
    impl AiClient for CannedClient {
        async fn generate(&self, _prompt: &str) -> Result<String, AiError> {
            Ok(self.0.to_string())
        }

        async fn chat(&self, _turns: &[ChatTurn]) -> Result<String, AiError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn healthy_reply_is_decoded() {
        let service = AnalysisService::new(Arc::new(StaticClient), fast_config());
        let findings = service.analyze("The system was implemented.").await;

        assert_eq!(findings.structural_score, 80);
        assert_eq!(findings.formatting_score, 70);
        assert_eq!(findings.grammar_score, 90);
        assert_eq!(findings.issues.len(), 2);
        assert!(findings.error.is_none());
    }

    #[tokio::test]
    async fn fenced_reply_is_decoded() {
        let fenced = "```json\n{\"structural_score\": 50, \"formatting_score\": 60, \"score\": 70, \"issues\": [], \"tone\": \"formal\", \"clarity\": 90}\n```";
        let service = AnalysisService::new(Arc::new(CannedClient(fenced)), fast_config());
        let findings = service.analyze("text").await;

        assert_eq!(findings.structural_score, 50);
        assert_eq!(findings.grammar_score, 70);
        assert!(findings.issues.is_empty());
        assert!(findings.error.is_none());
    }

    #[tokio::test]
    async fn quota_exhaustion_serves_fallback_after_retries() {
        let client = Arc::new(FailingClient::new(
            AiErrorKind::RateLimited,
            "quota exceeded",
        ));
        let service = AnalysisService::new(client.clone(), fast_config());
        let findings = service.analyze("text").await;

        // Initial attempt plus the full retry budget
        assert_eq!(client.calls.load(Ordering::SeqCst), 4);
        assert_eq!(findings, quota_fallback_findings());
        assert!(findings.structural_score > 0);
        assert_eq!(findings.issues.len(), 15);
        assert!(findings.error.is_none());
    }

    #[tokio::test]
    async fn non_quota_failure_is_not_retried() {
        let client = Arc::new(FailingClient::new(
            AiErrorKind::Upstream,
            "invalid API key",
        ));
        let service = AnalysisService::new(client.clone(), fast_config());
        let findings = service.analyze("text").await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(findings.structural_score, 0);
        assert_eq!(findings.formatting_score, 0);
        assert_eq!(findings.grammar_score, 0);
        assert_eq!(findings.issues.len(), 1);
        assert_eq!(findings.issues[0].kind, IssueKind::System);
        assert_eq!(findings.error.as_deref(), Some("invalid API key"));

        // The cause survives into the serialized violations blob
        assert_eq!(findings.issues[0].error.as_deref(), Some("invalid API key"));
        let blob = serde_json::to_string(&findings.issues).unwrap();
        assert!(blob.contains("invalid API key"));
    }

    #[tokio::test]
    async fn malformed_reply_degrades_to_failure_findings() {
        let service = AnalysisService::new(
            Arc::new(CannedClient("I could not produce JSON, sorry!")),
            fast_config(),
        );
        let findings = service.analyze("text").await;

        assert_eq!(findings.grammar_score, 0);
        assert_eq!(findings.issues.len(), 1);
        assert_eq!(findings.issues[0].kind, IssueKind::System);
        assert!(findings.error.is_some());
    }

    #[test]
    fn prompt_embeds_truncated_text_and_schema() {
        let prompt = build_analysis_prompt("INTRODUCTION The proposed system");
        assert!(prompt.contains("Anna University 2026"));
        assert!(prompt.contains("structural_score"));
        assert!(prompt.ends_with("INTRODUCTION The proposed system"));
    }
}
