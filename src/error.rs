//! Error taxonomy shared by every operation.
//!
//! Route handlers never let an error escape: they fold a [`BridgeError`]
//! into a JSON envelope with `status: "error"` and an `error_kind` that
//! tells callers whether the failure was a configuration problem, a hosted
//! service failure, or a local filesystem problem.

use thiserror::Error;

/// Result alias used by library operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required setting (usually an API key or URL) is missing or invalid.
    #[error("{0}")]
    Config(String),

    /// A hosted API returned an error or could not be reached.
    #[error("{service} error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    /// Reading or writing an uploaded file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The incoming request could not be parsed.
    #[error("invalid request: {0}")]
    Request(String),
}

impl BridgeError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }

    /// Machine-readable kind reported as `error_kind` in error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Upstream { .. } => "upstream",
            Self::Io(_) => "io",
            Self::Request(_) => "request",
        }
    }

    /// The message without the prefix `Display` adds for the kind.
    pub fn detail(&self) -> String {
        match self {
            Self::Config(msg) | Self::Request(msg) => msg.clone(),
            Self::Upstream { message, .. } => message.clone(),
            Self::Io(err) => err.to_string(),
        }
    }

    /// Prefix the message with extra context, keeping the kind.
    pub fn context(self, context: &str) -> Self {
        match self {
            Self::Config(msg) => Self::Config(format!("{}: {}", context, msg)),
            Self::Upstream { service, message } => Self::Upstream {
                service,
                message: format!("{}: {}", context, message),
            },
            Self::Io(err) => Self::Io(std::io::Error::new(
                err.kind(),
                format!("{}: {}", context, err),
            )),
            Self::Request(msg) => Self::Request(format!("{}: {}", context, msg)),
        }
    }
}

/// Map a transport-level `reqwest` failure to an upstream error.
pub(crate) fn transport(service: &'static str) -> impl FnOnce(reqwest::Error) -> BridgeError {
    move |err| BridgeError::upstream(service, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(BridgeError::config("x").kind(), "config");
        assert_eq!(BridgeError::upstream("gemini", "x").kind(), "upstream");
        assert_eq!(BridgeError::Request("x".into()).kind(), "request");
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(BridgeError::from(io).kind(), "io");
    }

    #[test]
    fn test_context_keeps_kind() {
        let err = BridgeError::upstream("gemini", "quota exceeded").context("normalizing");
        assert_eq!(err.kind(), "upstream");
        assert_eq!(err.to_string(), "gemini error: normalizing: quota exceeded");

        let err = BridgeError::config("GEMINI_API_KEY not set").context("gemini");
        assert_eq!(err.to_string(), "gemini: GEMINI_API_KEY not set");
    }

    #[test]
    fn test_detail_drops_kind_prefix() {
        let err = BridgeError::upstream("gemini", "quota exceeded").context("normalizing");
        assert_eq!(err.detail(), "normalizing: quota exceeded");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = BridgeError::from(io).context("normalizing");
        assert_eq!(err.detail(), "normalizing: gone");

        assert_eq!(BridgeError::Request("bad".into()).detail(), "bad");
    }
}
