use thiserror::Error;

/// How loudly a failure should be surfaced by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Everything that can go wrong between a submit and the last byte of a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("no API key configured (set one in the config file or the environment)")]
    MissingCredential,

    #[error("API key contains characters not allowed in an HTTP header")]
    InvalidCredential,

    #[error("a request is already in progress")]
    Busy,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("{reason}")]
    Network { reason: String },

    /// The server reported a failure inside an otherwise healthy stream.
    #[error("{0}")]
    Stream(String),

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("unexpected response: no text output")]
    EmptyOutput,

    #[error("background worker failed: {0}")]
    Worker(String),
}

impl ChatError {
    pub fn severity(&self) -> Severity {
        match self {
            ChatError::EmptyPrompt | ChatError::Busy => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub(crate) fn network(e: impl std::fmt::Display) -> Self {
        ChatError::Network {
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_renders_status_and_body() {
        let e = ChatError::Http {
            status: 401,
            body: r#"{"error":"bad key"}"#.to_string(),
        };
        assert_eq!(e.to_string(), r#"HTTP 401: {"error":"bad key"}"#);
    }

    #[test]
    fn severities() {
        assert_eq!(ChatError::EmptyPrompt.severity(), Severity::Warning);
        assert_eq!(ChatError::Busy.severity(), Severity::Warning);
        assert_eq!(ChatError::MissingCredential.severity(), Severity::Error);
        assert_eq!(ChatError::network("refused").severity(), Severity::Error);
        assert_eq!(ChatError::EmptyOutput.severity(), Severity::Error);
        assert_eq!(ChatError::InvalidCredential.severity(), Severity::Error);
        assert_eq!(ChatError::Stream("quota".into()).severity(), Severity::Error);
    }
}
