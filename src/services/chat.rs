use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::services::ai::{AiClient, AiErrorKind, ChatTurn, TurnRole};
use crate::utils::truncate_chars;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Served instead of an answer when the model reports quota exhaustion.
/// Chat is interactive, so there is no retry loop; the user can just ask again.
pub const QUOTA_FALLBACK_ANSWER: &str = "My AI systems are currently resting due to the volume of documents processed today! However, from the standard Anna University 2026 guidelines, I can tell you that the Cover Page must conform exactly to formatting, and all First-Person pronouns must be eliminated from your report. Check back later when my bandwidth resets!";

/// Question answering over analyzed reports, plus free-form guideline chat.
pub struct ChatService {
    db: DatabaseConnection,
    ai: Arc<dyn AiClient>,
    config: AppConfig,
}

impl ChatService {
    pub fn new(db: DatabaseConnection, ai: Arc<dyn AiClient>, config: AppConfig) -> Self {
        Self { db, ai, config }
    }

    /// Answer a question about one of the user's analyzed reports.
    ///
    /// The stored extracted text is the only context the model sees. Both the
    /// user turn and the assistant turn are persisted to the report's chat
    /// session, which is created lazily on first use.
    pub async fn ask_about_report(
        &self,
        user_id: &str,
        report_id: &str,
        message: &str,
    ) -> Result<String, AppError> {
        let report = Reports::find_by_id(report_id)
            .filter(reports::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Report not found".to_string()))?;

        let analysis = Analyses::find()
            .filter(analyses::Column::ReportId.eq(report.id.as_str()))
            .one(&self.db)
            .await?;

        // Fail before any AI call if there is nothing to ground the answer on.
        let context = match analysis {
            Some(ref a) if !a.full_text.trim().is_empty() => a.full_text.as_str(),
            _ => return Err(AppError::AnalysisContextMissing),
        };

        let prompt = build_context_prompt(
            truncate_chars(context, self.config.chat_context_chars),
            message,
        );

        // A single user turn through the chat interface
        let turns = [ChatTurn {
            role: TurnRole::User,
            content: prompt,
        }];

        let answer = match self.ai.chat(&turns).await {
            Ok(answer) => answer,
            Err(err) if err.kind == AiErrorKind::RateLimited => {
                warn!("AI quota exhausted during chat, serving canned answer: {}", err);
                QUOTA_FALLBACK_ANSWER.to_string()
            }
            Err(err) => {
                return Err(AppError::Internal(format!("Chat generation failed: {}", err)))
            }
        };

        let session_id = self.find_or_create_session(user_id, &report.id).await?;
        self.append_message(&session_id, chat_messages::ChatRole::User, message)
            .await?;
        self.append_message(&session_id, chat_messages::ChatRole::Assistant, &answer)
            .await?;

        Ok(answer)
    }

    /// Free-form guideline chat with no report context. Not persisted.
    pub async fn ask_general(
        &self,
        history: &[ChatTurn],
        message: &str,
    ) -> Result<String, AppError> {
        let mut turns = sanitize_history(history);
        turns.push(ChatTurn {
            role: TurnRole::User,
            content: message.to_string(),
        });

        match self.ai.chat(&turns).await {
            Ok(answer) => Ok(answer),
            Err(err) if err.kind == AiErrorKind::RateLimited => {
                warn!("AI quota exhausted during chat, serving canned answer: {}", err);
                Ok(QUOTA_FALLBACK_ANSWER.to_string())
            }
            Err(err) => Err(AppError::Internal(format!("Chat generation failed: {}", err))),
        }
    }

    async fn find_or_create_session(
        &self,
        user_id: &str,
        report_id: &str,
    ) -> Result<String, AppError> {
        let existing = ChatSessions::find()
            .filter(chat_sessions::Column::UserId.eq(user_id))
            .filter(chat_sessions::Column::ReportId.eq(report_id))
            .one(&self.db)
            .await?;

        if let Some(session) = existing {
            return Ok(session.id);
        }

        let session = chat_sessions::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            report_id: Set(Some(report_id.to_string())),
            created_at: Set(Some(Utc::now())),
        }
        .insert(&self.db)
        .await?;

        Ok(session.id)
    }

    async fn append_message(
        &self,
        session_id: &str,
        role: chat_messages::ChatRole,
        content: &str,
    ) -> Result<(), AppError> {
        chat_messages::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            session_id: Set(session_id.to_string()),
            role: Set(role),
            content: Set(content.to_string()),
            created_at: Set(Some(Utc::now())),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }
}

/// Drop leading assistant turns so the transcript opens with a user turn,
/// as the upstream chat API requires. Client UIs often seed the thread with
/// an assistant greeting.
pub fn sanitize_history(history: &[ChatTurn]) -> Vec<ChatTurn> {
    history
        .iter()
        .skip_while(|turn| turn.role != TurnRole::User)
        .cloned()
        .collect()
}

fn build_context_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful academic assistant analyzing a student report.\n\n\
         Context (Report Content):\n{}\n\n\
         User Question: {}\n\n\
         Answer the question based strictly on the provided context. If the answer is not in the context, say \"I cannot find that information in the report.\"\n\
         Keep answers concise and professional.",
        context, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database;
    use crate::models::DocumentFindings;
    use crate::services::ai::{AiError, StaticClient};
    use crate::services::report_service::{ReportService, UploadMeta};
    use async_trait::async_trait;
    use sea_orm::{ConnectOptions, Database, PaginatorTrait, QueryOrder};

    struct RateLimitedClient;

    #[async_trait]
    impl AiClient for RateLimitedClient {
        async fn generate(&self, _prompt: &str) -> Result<String, AiError> {
            Err(AiError::rate_limited("429 quota exceeded"))
        }

        async fn chat(&self, _turns: &[ChatTurn]) -> Result<String, AiError> {
            Err(AiError::rate_limited("429 quota exceeded"))
        }
    }

    /// Echoes the prompt back, so tests can inspect what the model was sent.
    struct EchoClient;

    #[async_trait]
    impl AiClient for EchoClient {
        async fn generate(&self, prompt: &str) -> Result<String, AiError> {
            Ok(prompt.to_string())
        }

        async fn chat(&self, turns: &[ChatTurn]) -> Result<String, AiError> {
            Ok(serde_json::to_string(turns).unwrap())
        }
    }

    async fn test_db() -> DatabaseConnection {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();
        database::run_migrations(&db).await.unwrap();
        db
    }

    async fn seed_user(db: &DatabaseConnection) -> String {
        let id = Uuid::new_v4().to_string();
        users::ActiveModel {
            id: Set(id.clone()),
            username: Set(format!("student-{}", &id[..8])),
            password_hash: Set("hash".to_string()),
            email: Set(None),
            created_at: Set(Some(Utc::now())),
        }
        .insert(db)
        .await
        .unwrap();
        id
    }

    async fn seed_report(db: &DatabaseConnection, user_id: &str, full_text: &str) -> String {
        let findings = DocumentFindings {
            structural_score: 80,
            formatting_score: 70,
            grammar_score: 90,
            issues: vec![],
            tone: "formal".to_string(),
            clarity: 85,
            error: None,
        };
        let saved = ReportService::new(db.clone())
            .save_analysis(
                user_id,
                UploadMeta {
                    filename: "report.pdf".to_string(),
                    mime_type: "application/pdf".to_string(),
                    size_bytes: 1024,
                },
                &findings,
                80,
                full_text,
            )
            .await
            .unwrap();
        saved.report.id
    }

    fn service(db: DatabaseConnection, ai: Arc<dyn AiClient>) -> ChatService {
        ChatService::new(db, ai, AppConfig::development())
    }

    #[tokio::test]
    async fn contextual_chat_persists_both_turns() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;
        let report_id = seed_report(&db, &user_id, "The abstract summarizes the project.").await;

        let chat = service(db.clone(), Arc::new(StaticClient));
        let answer = chat
            .ask_about_report(&user_id, &report_id, "What does the abstract say?")
            .await
            .unwrap();
        assert_eq!(answer, StaticClient::CHAT_REPLY);

        let sessions = ChatSessions::find().all(&db).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].report_id.as_deref(), Some(report_id.as_str()));

        let messages = ChatMessages::find()
            .order_by_asc(chat_messages::Column::CreatedAt)
            .all(&db)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, chat_messages::ChatRole::User);
        assert_eq!(messages[0].content, "What does the abstract say?");
        assert_eq!(messages[1].role, chat_messages::ChatRole::Assistant);
    }

    #[tokio::test]
    async fn session_is_reused_across_questions() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;
        let report_id = seed_report(&db, &user_id, "Chapter text.").await;

        let chat = service(db.clone(), Arc::new(StaticClient));
        chat.ask_about_report(&user_id, &report_id, "First question")
            .await
            .unwrap();
        chat.ask_about_report(&user_id, &report_id, "Second question")
            .await
            .unwrap();

        assert_eq!(ChatSessions::find().count(&db).await.unwrap(), 1);
        assert_eq!(ChatMessages::find().count(&db).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn unknown_report_is_not_found_before_ai_call() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;

        let chat = service(db.clone(), Arc::new(RateLimitedClient));
        let err = chat
            .ask_about_report(&user_id, "no-such-report", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(ChatMessages::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_context_fails_fast() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;
        let report_id = seed_report(&db, &user_id, "   ").await;

        let chat = service(db.clone(), Arc::new(StaticClient));
        let err = chat
            .ask_about_report(&user_id, &report_id, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AnalysisContextMissing));
    }

    #[tokio::test]
    async fn other_users_report_is_hidden() {
        let db = test_db().await;
        let owner = seed_user(&db).await;
        let stranger = seed_user(&db).await;
        let report_id = seed_report(&db, &owner, "Private content.").await;

        let chat = service(db.clone(), Arc::new(StaticClient));
        let err = chat
            .ask_about_report(&stranger, &report_id, "What is in it?")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn quota_exhaustion_yields_canned_answer_and_persists() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;
        let report_id = seed_report(&db, &user_id, "Some report body.").await;

        let chat = service(db.clone(), Arc::new(RateLimitedClient));
        let answer = chat
            .ask_about_report(&user_id, &report_id, "hello")
            .await
            .unwrap();
        assert_eq!(answer, QUOTA_FALLBACK_ANSWER);
        // The canned exchange is still recorded in the session
        assert_eq!(ChatMessages::find().count(&db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn context_is_truncated_to_window() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;
        let long_text = "x".repeat(50_000);
        let report_id = seed_report(&db, &user_id, &long_text).await;

        let mut config = AppConfig::development();
        config.chat_context_chars = 100;
        let chat = ChatService::new(db.clone(), Arc::new(EchoClient), config);

        let prompt = chat
            .ask_about_report(&user_id, &report_id, "q")
            .await
            .unwrap();
        assert!(prompt.contains(&"x".repeat(100)));
        assert!(!prompt.contains(&"x".repeat(101)));
    }

    #[tokio::test]
    async fn general_chat_sanitizes_history_and_skips_persistence() {
        let db = test_db().await;
        let chat = service(db.clone(), Arc::new(EchoClient));

        let history = vec![
            ChatTurn {
                role: TurnRole::Assistant,
                content: "Hi! Ask me about the guidelines.".to_string(),
            },
            ChatTurn {
                role: TurnRole::User,
                content: "What font is required?".to_string(),
            },
        ];

        let answer = chat
            .ask_general(&history, "And the margins?")
            .await
            .unwrap();
        let sent: Vec<ChatTurn> = serde_json::from_str(&answer).unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].role, TurnRole::User);
        assert_eq!(sent[0].content, "What font is required?");
        assert_eq!(sent[1].content, "And the margins?");

        assert_eq!(ChatMessages::find().count(&db).await.unwrap(), 0);
        assert_eq!(ChatSessions::find().count(&db).await.unwrap(), 0);
    }

    #[test]
    fn sanitize_keeps_interior_assistant_turns() {
        let history = vec![
            ChatTurn {
                role: TurnRole::User,
                content: "a".to_string(),
            },
            ChatTurn {
                role: TurnRole::Assistant,
                content: "b".to_string(),
            },
        ];
        assert_eq!(sanitize_history(&history).len(), 2);
    }
}
