use reqwest::StatusCode;

/// Errors from the remote drive API and the download path.
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    /// The item vanished (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Token expired, revoked or lacking permission (HTTP 401/403).
    #[error("Authorization failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Connection, TLS or timeout failure before a response arrived.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Any other non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Response decode error: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<DriveError> },
}

impl DriveError {
    /// Map a non-success HTTP status and its body.
    pub fn from_status(status: StatusCode, body: &str, retry_after_secs: Option<u64>) -> Self {
        let message = truncate(body, 300);
        match status.as_u16() {
            404 | 410 => DriveError::NotFound(message),
            401 | 403 => DriveError::Auth {
                status: status.as_u16(),
                message,
            },
            429 => DriveError::RateLimited { retry_after_secs },
            s if status.is_server_error() => DriveError::Server { status: s, message },
            s => DriveError::Api { status: s, message },
        }
    }

    /// Whether trying the same request again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriveError::Transport(_) | DriveError::Server { .. } | DriveError::RateLimited { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            DriveError::NotFound(_) => true,
            DriveError::Exhausted { last, .. } => last.is_not_found(),
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        match self {
            DriveError::Auth { .. } => true,
            DriveError::Exhausted { last, .. } => last.is_auth(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DriveError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return DriveError::Decode(e.to_string());
        }
        match e.status() {
            Some(status) => DriveError::from_status(status, &e.to_string(), None),
            None => DriveError::Transport(e.to_string()),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
