use thiserror::Error;

/// Misuse of the client API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserError {
    #[error("not connected")]
    NotConnected,
    #[error("no active session")]
    NoSession,
    #[error("a session is already active")]
    AlreadyConnected,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Every failure the client can surface. All of them reach the caller as an
/// `error` event; none is allowed to escape a task.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The signaling server could not be reached.
    #[error("network error: {0}")]
    Network(String),
    /// The signaling server answered with a non-success status or an unreadable body.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// The transport peer rejected an operation.
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("user error: {0}")]
    User(#[from] UserError),
    /// Internal bug. Never expected in a correct run.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Discriminant of [`ClientError`], for callers that only branch on the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Server,
    Protocol,
    User,
    InvariantViolation,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Network(_) => ErrorKind::Network,
            ClientError::Server { .. } => ErrorKind::Server,
            ClientError::Protocol(_) => ErrorKind::Protocol,
            ClientError::User(_) => ErrorKind::User,
            ClientError::InvariantViolation(_) => ErrorKind::InvariantViolation,
        }
    }

    pub fn user_error(&self) -> Option<&UserError> {
        match self {
            ClientError::User(e) => Some(e),
            _ => None,
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        ClientError::Protocol(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        ClientError::InvariantViolation(msg.into())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        // Only `error_for_status` attaches a status.
        match e.status() {
            Some(status) => ClientError::Server {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => ClientError::Network(e.to_string()),
        }
    }
}

impl From<webrtc::Error> for ClientError {
    fn from(e: webrtc::Error) -> Self {
        ClientError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_variant() {
        assert_eq!(ClientError::Network("refused".into()).kind(), ErrorKind::Network);
        assert_eq!(
            ClientError::Server {
                status: 500,
                message: "boom".into()
            }
            .kind(),
            ErrorKind::Server
        );
        assert_eq!(ClientError::protocol("x").kind(), ErrorKind::Protocol);
        assert_eq!(ClientError::invariant("x").kind(), ErrorKind::InvariantViolation);

        let err: ClientError = UserError::NotConnected.into();
        assert_eq!(err.kind(), ErrorKind::User);
        assert_eq!(err.user_error(), Some(&UserError::NotConnected));
    }

    #[test]
    fn display_includes_status() {
        let err = ClientError::Server {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "server error (503): unavailable");
    }
}
