use std::env;

/// Application configuration for the analysis pipeline
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Maximum upload size in bytes (default: 10 MiB)
    pub max_file_size: usize,

    /// AI backend: "gemini" or "static" (default: "gemini")
    pub ai_provider: String,

    /// Gemini model name (default: "gemini-2.5-flash")
    pub ai_model: String,

    /// Upstream request timeout in seconds (default: 120)
    pub ai_timeout_secs: u64,

    /// Retry budget for rate-limited analysis calls (default: 3)
    pub ai_max_retries: u32,

    /// Initial backoff delay in milliseconds (default: 10s)
    pub ai_retry_base_ms: u64,

    /// Character window submitted for document analysis (default: 1500)
    pub analysis_char_window: usize,

    /// Character window of report text forwarded as chat context (default: 20000)
    pub chat_context_chars: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024, // 10 MiB
            ai_provider: "gemini".to_string(),
            ai_model: "gemini-2.5-flash".to_string(),
            ai_timeout_secs: 120,
            ai_max_retries: 3,
            ai_retry_base_ms: 10_000,
            analysis_char_window: 1500,
            chat_context_chars: 20_000,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            ai_provider: env::var("AI_PROVIDER").unwrap_or(default.ai_provider),

            ai_model: env::var("GEMINI_MODEL").unwrap_or(default.ai_model),

            ai_timeout_secs: env::var("GEMINI_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.ai_timeout_secs),

            ai_max_retries: env::var("GEMINI_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.ai_max_retries),

            ai_retry_base_ms: env::var("GEMINI_RETRY_BASE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.ai_retry_base_ms),

            analysis_char_window: env::var("ANALYSIS_CHAR_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.analysis_char_window),

            chat_context_chars: env::var("CHAT_CONTEXT_CHARS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.chat_context_chars),
        }
    }

    /// Config for development and tests (canned AI, no network, no backoff waits)
    pub fn development() -> Self {
        Self {
            ai_provider: "static".to_string(),
            ai_retry_base_ms: 1,
            ..Self::default()
        }
    }
}
