//! Failure taxonomy for upstream responses
//!
//! Every failed attempt is forced through an explicit classification so the
//! retry-vs-abort decision is exhaustive over status codes, not inferred from
//! error text. A quota status means the *credential* is spent and another one
//! is worth trying; any other error status means the *request* is bad and no
//! credential will fare better.

/// How a failed attempt should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection, timeout, or body-read failure. Retry with another
    /// credential; counts against the one that failed.
    Transport,
    /// Quota/rate-limit status. Retry with another credential immediately
    /// (independent quotas); quarantines the one that hit its cap.
    RateLimited,
    /// Any other non-2xx. The request itself is assumed bad; surfaced to the
    /// caller without trying further credentials.
    Request,
}

impl FailureKind {
    /// Whether the same logical call should continue with another credential.
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureKind::Transport | FailureKind::RateLimited => true,
            FailureKind::Request => false,
        }
    }

    /// Classification label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Request => "request",
        }
    }
}

/// Statuses the aggregation service uses to signal a credential's usage cap.
///
/// 495 is the service's own quota-exceeded status; 429 is the standard
/// rate-limit status. Both mean the credential, not the request, is at fault.
const RATE_LIMIT_STATUSES: &[u16] = &[429, 495];

/// Classify a non-2xx HTTP status.
pub fn classify_status(status: u16) -> FailureKind {
    if RATE_LIMIT_STATUSES.contains(&status) {
        FailureKind::RateLimited
    } else {
        FailureKind::Request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_495_is_rate_limited() {
        assert_eq!(classify_status(495), FailureKind::RateLimited);
    }

    #[test]
    fn classify_429_is_rate_limited() {
        assert_eq!(classify_status(429), FailureKind::RateLimited);
    }

    #[test]
    fn classify_other_4xx_is_request_error() {
        assert_eq!(classify_status(400), FailureKind::Request);
        assert_eq!(classify_status(403), FailureKind::Request);
        assert_eq!(classify_status(404), FailureKind::Request);
    }

    #[test]
    fn classify_5xx_is_request_error() {
        assert_eq!(classify_status(500), FailureKind::Request);
        assert_eq!(classify_status(503), FailureKind::Request);
    }

    #[test]
    fn rate_limited_and_transport_are_retryable() {
        assert!(FailureKind::RateLimited.is_retryable());
        assert!(FailureKind::Transport.is_retryable());
    }

    #[test]
    fn request_errors_are_terminal() {
        assert!(!FailureKind::Request.is_retryable());
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(FailureKind::Transport.label(), "transport");
        assert_eq!(FailureKind::RateLimited.label(), "rate_limited");
        assert_eq!(FailureKind::Request.label(), "request");
    }
}
