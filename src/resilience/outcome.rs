//! Attempt outcome classification.
//!
//! # Responsibilities
//! - Turn one raw attempt (response or transport fault) into an `Outcome`
//! - Be the only place retry and breaker decisions are derived from
//!
//! # Design Decisions
//! - Transport faults are transient, except requests that could not be built
//! - 5xx and 408 are transient by default; 404 is NOT unless configured
//! - Everything else that came back from the downstream is a success

use std::collections::BTreeSet;
use std::fmt;

use axum::http::StatusCode;

use crate::transport::{DownstreamResponse, TransportFault};

/// What went wrong in a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureInfo {
    Status(StatusCode),
    Fault(String),
}

impl fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureInfo::Status(status) => write!(f, "status {}", status),
            FailureInfo::Fault(reason) => write!(f, "{}", reason),
        }
    }
}

/// Classified result of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    TransientFailure(FailureInfo),
    PermanentFailure(FailureInfo),
}

impl Outcome {
    pub fn is_transient(&self) -> bool {
        matches!(self, Outcome::TransientFailure(_))
    }

    pub fn failure(&self) -> Option<&FailureInfo> {
        match self {
            Outcome::Success => None,
            Outcome::TransientFailure(info) | Outcome::PermanentFailure(info) => Some(info),
        }
    }

    /// Short label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::TransientFailure(_) => "transient",
            Outcome::PermanentFailure(_) => "permanent",
        }
    }
}

/// Decides which attempts count as failures.
#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    server_errors_transient: bool,
    transient: BTreeSet<u16>,
    permanent: BTreeSet<u16>,
}

impl Default for OutcomeClassifier {
    fn default() -> Self {
        Self {
            server_errors_transient: true,
            transient: BTreeSet::from([StatusCode::REQUEST_TIMEOUT.as_u16()]),
            permanent: BTreeSet::new(),
        }
    }
}

impl OutcomeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `status` as transient in addition to the defaults (e.g. 404 for a
    /// catalog that is only eventually consistent).
    pub fn with_transient_status(mut self, status: u16) -> Self {
        self.transient.insert(status);
        self
    }

    /// Fail fast on `status` without retrying or touching breaker health.
    pub fn with_permanent_status(mut self, status: u16) -> Self {
        self.permanent.insert(status);
        self
    }

    pub fn server_errors_transient(mut self, enabled: bool) -> Self {
        self.server_errors_transient = enabled;
        self
    }

    pub fn classify_status(&self, status: StatusCode) -> Outcome {
        let code = status.as_u16();
        if self.transient.contains(&code) || (self.server_errors_transient && status.is_server_error()) {
            Outcome::TransientFailure(FailureInfo::Status(status))
        } else if self.permanent.contains(&code) {
            Outcome::PermanentFailure(FailureInfo::Status(status))
        } else {
            Outcome::Success
        }
    }

    pub fn classify_fault(&self, fault: &TransportFault) -> Outcome {
        match fault {
            TransportFault::InvalidRequest(_) => Outcome::PermanentFailure(FailureInfo::Fault(fault.to_string())),
            _ => Outcome::TransientFailure(FailureInfo::Fault(fault.to_string())),
        }
    }

    pub fn classify(&self, result: &Result<DownstreamResponse, TransportFault>) -> Outcome {
        match result {
            Ok(response) => self.classify_status(response.status),
            Err(fault) => self.classify_fault(fault),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_policy() {
        let c = OutcomeClassifier::default();
        assert_eq!(c.classify_status(StatusCode::OK), Outcome::Success);
        assert_eq!(c.classify_status(StatusCode::NOT_FOUND), Outcome::Success);
        assert!(c.classify_status(StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(c.classify_status(StatusCode::INTERNAL_SERVER_ERROR).is_transient());
        assert!(c.classify_status(StatusCode::REQUEST_TIMEOUT).is_transient());
    }

    #[test]
    fn test_not_found_opt_in() {
        let c = OutcomeClassifier::default().with_transient_status(404);
        assert_eq!(
            c.classify_status(StatusCode::NOT_FOUND),
            Outcome::TransientFailure(FailureInfo::Status(StatusCode::NOT_FOUND))
        );
    }

    #[test]
    fn test_permanent_statuses() {
        let c = OutcomeClassifier::default().with_permanent_status(400);
        assert!(matches!(
            c.classify_status(StatusCode::BAD_REQUEST),
            Outcome::PermanentFailure(_)
        ));

        // Transient wins when a code is listed twice.
        let c = c.with_transient_status(400);
        assert!(c.classify_status(StatusCode::BAD_REQUEST).is_transient());
    }

    #[test]
    fn test_server_errors_can_be_disabled() {
        let c = OutcomeClassifier::default().server_errors_transient(false);
        assert_eq!(c.classify_status(StatusCode::BAD_GATEWAY), Outcome::Success);
    }

    #[test]
    fn test_transport_faults() {
        let c = OutcomeClassifier::default();
        assert!(c.classify(&Err(TransportFault::Connect("refused".into()))).is_transient());
        assert!(c.classify(&Err(TransportFault::Timeout(Duration::from_secs(1)))).is_transient());
        assert!(matches!(
            c.classify(&Err(TransportFault::InvalidRequest("bad uri".into()))),
            Outcome::PermanentFailure(_)
        ));
    }
}
