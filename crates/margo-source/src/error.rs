//! Error type for source-system calls

use margo_core::Retryable;

/// Error from a call against the upstream ERP.
///
/// Transport problems and server errors are retryable; protocol and
/// authentication faults are not. A missing model is its own variant so
/// adapters can degrade gracefully instead of failing the whole run.
#[derive(Debug)]
pub enum SourceError {
    /// HTTP-level failure with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Application-level fault reported by the RPC endpoint
    Rpc { code: i64, message: String },
    /// Response did not match the expected shape
    Protocol(String),
    /// Login rejected / session invalid
    Auth(String),
    /// The source does not expose the requested model
    MissingModel(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Rpc { code, message } => write!(f, "RPC fault {code}: {message}"),
            Self::Protocol(m) => write!(f, "protocol error: {m}"),
            Self::Auth(m) => write!(f, "authentication failed: {m}"),
            Self::MissingModel(m) => write!(f, "model not available: {m}"),
        }
    }
}

impl std::error::Error for SourceError {}

impl SourceError {
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        match self {
            // No status = transport error (refused, reset, timeout)
            Self::Http { status: None, .. } => true,
            Self::Http {
                status: Some(s), ..
            } => *s == 408 || *s == 429 || *s >= 500,
            Self::Rpc { .. } | Self::Protocol(_) | Self::Auth(_) | Self::MissingModel(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_err(status: u16) -> SourceError {
        SourceError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn http_500_retryable() {
        assert!(http_err(500).is_retryable());
    }

    #[test]
    fn http_429_retryable() {
        assert!(http_err(429).is_retryable());
    }

    #[test]
    fn http_404_not_retryable() {
        assert!(!http_err(404).is_retryable());
    }

    #[test]
    fn http_none_status_retryable() {
        let err = SourceError::Http {
            status: None,
            message: "connection refused".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn rpc_fault_not_retryable() {
        let err = SourceError::Rpc {
            code: 200,
            message: "ValidationError".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn auth_not_retryable() {
        assert!(!SourceError::Auth("bad key".to_string()).is_retryable());
    }

    #[test]
    fn missing_model_not_retryable() {
        assert!(!SourceError::MissingModel("pos.order".to_string()).is_retryable());
    }

    #[test]
    fn display_http_with_status() {
        assert_eq!(format!("{}", http_err(503)), "HTTP 503: test");
    }
}
