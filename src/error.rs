use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Network failure before the remote service produced a response.
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote service responded with a non-success status.
    #[error("Pocket API error: HTTP {status} [{remote_error}]")]
    Request { status: u16, remote_error: String },

    /// 401-equivalent while a token was attached. Raising this also evicts
    /// the stored access token (see the gateway), forcing a re-login.
    #[error("Not authorized with Pocket: HTTP {status} [{remote_error}]")]
    Authentication { status: u16, remote_error: String },

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// The out-of-band error detail the remote service sends in its
    /// X-Error header, when this error carries one.
    pub fn remote_error(&self) -> Option<&str> {
        match self {
            AppError::Request { remote_error, .. }
            | AppError::Authentication { remote_error, .. } => Some(remote_error),
            _ => None,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, AppError::Authentication { .. })
    }
}
