//! Server configuration, loaded from environment variables at startup.

use crate::auth::DEFAULT_ROUNDS;

/// Shape of the `response` member returned by `POST /api/chat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ResponseFormat {
    /// A flat `[{type, content}]` array.
    #[default]
    Segments,
    /// `{text_content, logo_content}` for older clients.
    Legacy,
}

/// Runtime configuration for chatbot-server.
///
/// Every field has a default so the server starts without any environment
/// variables set; only `GOOGLE_API_KEY` is needed for `/api/chat` to succeed.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:5000"`).
    pub bind_address: String,

    /// SQLite database URL (default: `"sqlite://chatbot.db"`).
    pub database_url: String,

    pub google_api_key: Option<String>,

    /// Gemini model id (default: `"gemini-2.5-flash"`).
    pub gemini_model: String,

    pub gemini_base_url: String,

    /// Seconds before an upstream model call is abandoned.
    pub upstream_timeout_secs: u64,

    /// HS256 signing secret for session tokens.  A random one is generated
    /// at startup when unset.
    pub jwt_secret: Option<String>,

    pub token_ttl_hours: i64,

    /// PBKDF2 iteration count for new password hashes.
    pub password_rounds: u32,

    /// Comma-separated allowed origins; wildcard when unset.
    pub cors_allowed_origins: Option<String>,

    pub enable_swagger: bool,

    /// Upper bound on a `/api/chat` request body.
    pub max_upload_mb: usize,

    pub response_format: ResponseFormat,

    /// Split an all-caps first line off as a logo label.
    pub detect_logo: bool,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// When set, logs are also written to a daily-rolling file here.
    pub log_dir: Option<String>,
}

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_owned(),
            database_url: "sqlite://chatbot.db".to_owned(),
            google_api_key: None,
            gemini_model: "gemini-2.5-flash".to_owned(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_owned(),
            upstream_timeout_secs: 30,
            jwt_secret: None,
            token_ttl_hours: 168,
            password_rounds: DEFAULT_ROUNDS,
            cors_allowed_origins: None,
            enable_swagger: true,
            max_upload_mb: 20,
            response_format: ResponseFormat::Segments,
            detect_logo: false,
            log_level: "info".to_owned(),
            log_json: false,
            log_dir: None,
        }
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bind_address: env_or("CHATBOT_BIND", &d.bind_address),
            database_url: env_or("CHATBOT_DATABASE_URL", &d.database_url),
            google_api_key: env_opt("GOOGLE_API_KEY"),
            gemini_model: env_or("CHATBOT_GEMINI_MODEL", &d.gemini_model),
            gemini_base_url: env_or("CHATBOT_GEMINI_BASE_URL", &d.gemini_base_url),
            upstream_timeout_secs: parse_env("CHATBOT_UPSTREAM_TIMEOUT_SECS", d.upstream_timeout_secs),
            jwt_secret: env_opt("JWT_SECRET"),
            token_ttl_hours: parse_env("CHATBOT_TOKEN_TTL_HOURS", d.token_ttl_hours),
            password_rounds: parse_env("CHATBOT_PASSWORD_ROUNDS", d.password_rounds),
            cors_allowed_origins: env_opt("CHATBOT_CORS_ORIGINS"),
            enable_swagger: flag_env("CHATBOT_ENABLE_SWAGGER", d.enable_swagger),
            max_upload_mb: parse_env("CHATBOT_MAX_UPLOAD_MB", d.max_upload_mb),
            response_format: parse_env("CHATBOT_RESPONSE_FORMAT", d.response_format),
            detect_logo: flag_env("CHATBOT_DETECT_LOGO", d.detect_logo),
            log_level: env_or("CHATBOT_LOG", &d.log_level),
            log_json: flag_env("CHATBOT_LOG_JSON", d.log_json),
            log_dir: env_opt("CHATBOT_LOG_DIR"),
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn flag_env(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
