//! Error types for pool operations

/// Errors surfaced by the pool to callers.
///
/// Health bookkeeping has already happened by the time any of these is
/// returned; the pool never drops a failure without charging the credential
/// that produced it (pool exhaustion charges nobody).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No active credential was available for selection.
    #[error("pool exhausted: {0}")]
    PoolExhausted(String),

    /// Upstream rejected the request itself (non-quota error status);
    /// other credentials were not tried.
    #[error("upstream returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Every credential was tried and none produced a success.
    #[error("all credentials failed, last error: {0}")]
    AllFailed(String),
}

impl Error {
    /// HTTP status observed upstream, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Upstream { status, .. } => Some(*status),
            Error::PoolExhausted(_) | Error::AllFailed(_) => None,
        }
    }
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_and_message() {
        let err = Error::Upstream {
            status: 403,
            message: "invalid parameters".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("403"), "got: {msg}");
        assert!(msg.contains("invalid parameters"), "got: {msg}");
    }

    #[test]
    fn status_only_set_for_upstream_errors() {
        assert_eq!(
            Error::Upstream {
                status: 404,
                message: String::new()
            }
            .status(),
            Some(404)
        );
        assert_eq!(Error::PoolExhausted("0/3 active".into()).status(), None);
        assert_eq!(Error::AllFailed("timeout".into()).status(), None);
    }
}
