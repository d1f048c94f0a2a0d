/// Shared error type used across all crates in this workspace.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// A non-2xx response from an LLM provider's HTTP API, carrying the
    /// status code so callers can decide retryability without matching on
    /// the message text.
    #[error("LLM API error ({provider} {status}): {body}")]
    LlmApi {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    /// A guard in the guard stack denied a tool call (undo-guarantee or
    /// approval). Non-fatal: the chat loop catches this and records a
    /// synthetic tool result instead of propagating it.
    #[error("blocked by undo-guarantee gate: {0}")]
    UndoGuaranteeBlocked(String),

    #[error("denied by approval gate: {0}")]
    ApprovalDenied(String),

    /// Raised pre-run when the daily spend budget is already exhausted.
    /// Maps to HTTP 429 with `code=CHAT_SPEND_LIMIT_REACHED`.
    #[error("spend limit reached: spent {spent_usd:.4} of {budget_usd:.4} budget")]
    SpendLimitReached { spent_usd: f64, budget_usd: f64 },

    /// Maps to HTTP 400 with `code=CHAT_ATTACHMENT_INVALID`.
    #[error("invalid attachment: {0}")]
    AttachmentInvalid(String),

    /// Maps to HTTP 423 with `code=DAEMON_OPERATION_MODE_BLOCK`.
    #[error("daemon operation blocked: {0}")]
    DaemonOperationBlocked(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify an `LlmApi` error: `401`/`403` are non-retryable auth failures,
    /// `429` and `5xx` are retryable via the fallback list, other `4xx`
    /// are non-retryable bad-request errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::Http(_) => true,
            Error::LlmApi { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// `true` for 401/403 `LlmApi` errors — a re-check-your-key situation.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::LlmApi { status, .. } if *status == 401 || *status == 403)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_retryable() {
        let e = Error::LlmApi {
            provider: "openai".into(),
            status: 429,
            body: "".into(),
        };
        assert!(e.is_retryable());
        assert!(!e.is_auth_error());
    }

    #[test]
    fn server_error_is_retryable() {
        let e = Error::LlmApi {
            provider: "openai".into(),
            status: 503,
            body: "".into(),
        };
        assert!(e.is_retryable());
    }

    #[test]
    fn auth_error_is_not_retryable() {
        let e = Error::LlmApi {
            provider: "openai".into(),
            status: 401,
            body: "".into(),
        };
        assert!(!e.is_retryable());
        assert!(e.is_auth_error());
    }

    #[test]
    fn bad_request_is_not_retryable() {
        let e = Error::LlmApi {
            provider: "openai".into(),
            status: 400,
            body: "".into(),
        };
        assert!(!e.is_retryable());
    }

    #[test]
    fn timeout_is_retryable() {
        assert!(Error::Timeout("slow".into()).is_retryable());
    }
}
