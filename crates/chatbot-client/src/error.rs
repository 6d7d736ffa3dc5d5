use chatbot_core::ReplyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Reply(#[from] ReplyError),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e)
        }
    }
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 401/403 from the backend: the stored session is no longer usable.
    pub fn is_auth(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}
