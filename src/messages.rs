use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Commands the presentation layer sends into the core. Closed tagged
/// union; the serde tag is the wire encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    StartAuthentication,
    FinishAuthentication { code: String },
    IsAuthenticated,
    Sync { force: bool },
    Snooze { url: String, until_timestamp: i64 },
    Unsnooze { item_id: String },
    Archive { item_id: String },
}

/// Closed error-kind enumeration for the serialization boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Request,
    Authentication,
    Storage,
    Internal,
}

/// Error shape that survives the message boundary. Plain error types do
/// not serialize, so replies carry this reconstruction instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
    pub remote_error: Option<String>,
}

impl From<&AppError> for WireError {
    fn from(error: &AppError) -> Self {
        let kind = match error {
            AppError::Transport(_) => ErrorKind::Transport,
            AppError::Request { .. } => ErrorKind::Request,
            AppError::Authentication { .. } => ErrorKind::Authentication,
            AppError::Database(_) => ErrorKind::Storage,
            _ => ErrorKind::Internal,
        };
        Self {
            kind,
            message: error.to_string(),
            remote_error: error.remote_error().map(str::to_string),
        }
    }
}

/// Reply to a command: a tagged success payload or a wire error, never a
/// raised exception.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Done,
    Authenticated { authenticated: bool },
    /// The login handshake needs the user to approve `url` in a browser,
    /// then send `finish_authentication` with the same code.
    AuthorizationPending { url: String, code: String },
    Failed { error: WireError },
}

impl Outcome {
    pub fn failed(error: &AppError) -> Self {
        Outcome::Failed {
            error: WireError::from(error),
        }
    }
}
