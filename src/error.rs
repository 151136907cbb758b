//! Error taxonomy for the RPC transport chain.
//!
//! Every outcome a caller can observe from [`crate::Orchestrator::call`] is a
//! variant of [`CallError`]. The set is exhaustive and mutually exclusive —
//! exactly one variant describes why a given call did not return a value.

use std::fmt;
use std::time::Duration;

/// Classification of an upstream failure, as reported by the caller-supplied
/// wire implementation.
///
/// Only the *infrastructure* kinds advance a [`crate::CircuitBreaker`]'s
/// failure counter; `Business` and `Cancelled` pass through unchanged. This
/// mirrors the default classification list from the component design:
/// timeout, connection-refused, connection-reset, DNS failure, 5xx status,
/// protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The operation exceeded its deadline.
    Timeout,
    /// The transport could not establish a connection.
    ConnectionRefused,
    /// An established connection was reset mid-flight.
    ConnectionReset,
    /// Name resolution failed.
    Dns,
    /// The upstream answered with an HTTP-style status code.
    Http(u16),
    /// The response could not be parsed per the wire protocol.
    Protocol,
    /// A non-infrastructure failure: bad params, auth rejection, and other
    /// 4xx-style semantics. Never advances breaker failure counts.
    Business,
    /// The call was cooperatively cancelled.
    Cancelled,
}

impl ErrorKind {
    /// Infrastructure errors advance circuit breaker failure counts;
    /// business errors and cancellations do not.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            ErrorKind::Timeout
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::Dns
            | ErrorKind::Protocol => true,
            ErrorKind::Http(status) => *status >= 500,
            ErrorKind::Business | ErrorKind::Cancelled => false,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::ConnectionRefused => write!(f, "connection refused"),
            ErrorKind::ConnectionReset => write!(f, "connection reset"),
            ErrorKind::Dns => write!(f, "dns failure"),
            ErrorKind::Http(status) => write!(f, "http {status}"),
            ErrorKind::Protocol => write!(f, "protocol error"),
            ErrorKind::Business => write!(f, "business error"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A failure reported by the caller-supplied wire implementation.
///
/// Carries the classification the orchestrator needs to route the outcome
/// (into `upstream_error`, `business_error`, `timeout`, or `cancelled`) plus
/// a human-readable message for diagnostics.
#[derive(Debug, Clone)]
pub struct UpstreamFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl UpstreamFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for UpstreamFailure {}

/// The sole result type of [`crate::Orchestrator::call`].
///
/// Each variant is independently observable; the orchestrator never wraps
/// one outcome inside another.
#[derive(Debug, Clone)]
pub enum CallError {
    /// Admission denied by the token bucket.
    RateLimited,
    /// The breaker is `OPEN` and no probe is currently eligible.
    CircuitOpen { failure_count: usize, open_duration: Duration },
    /// The breaker is `HALF_OPEN` and a probe is already in flight.
    HalfOpenProbeActive,
    /// The connection pool is saturated (global or per-host cap).
    NoConnection { active: usize, max: usize },
    /// Every configured endpoint is currently unhealthy.
    NoEndpointAvailable,
    /// The call's deadline, or the breaker's `operationTimeout`, elapsed.
    Timeout { elapsed: Duration, limit: Duration },
    /// A classified infrastructure error from the wire.
    UpstreamError { endpoint_id: String, source: UpstreamFailure },
    /// A classified non-infrastructure error from the wire. Does not count
    /// against the breaker.
    BusinessError { endpoint_id: String, source: UpstreamFailure },
    /// The call was cooperatively cancelled.
    Cancelled,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::CircuitOpen { failure_count, open_duration } => write!(
                f,
                "circuit open ({failure_count} consecutive failures, open for {open_duration:?})"
            ),
            Self::HalfOpenProbeActive => write!(f, "half-open probe already in flight"),
            Self::NoConnection { active, max } => {
                write!(f, "no connection available ({active}/{max} in use)")
            }
            Self::NoEndpointAvailable => write!(f, "no healthy endpoint available"),
            Self::Timeout { elapsed, limit } => {
                write!(f, "timed out after {elapsed:?} (limit {limit:?})")
            }
            Self::UpstreamError { endpoint_id, source } => {
                write!(f, "upstream error from {endpoint_id}: {source}")
            }
            Self::BusinessError { endpoint_id, source } => {
                write!(f, "business error from {endpoint_id}: {source}")
            }
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UpstreamError { source, .. } | Self::BusinessError { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl CallError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn is_half_open_probe_active(&self) -> bool {
        matches!(self, Self::HalfOpenProbeActive)
    }

    pub fn is_no_connection(&self) -> bool {
        matches!(self, Self::NoConnection { .. })
    }

    pub fn is_no_endpoint_available(&self) -> bool {
        matches!(self, Self::NoEndpointAvailable)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_upstream_error(&self) -> bool {
        matches!(self, Self::UpstreamError { .. })
    }

    pub fn is_business_error(&self) -> bool {
        matches!(self, Self::BusinessError { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True for outcomes that should advance a circuit breaker's failure
    /// count — everything except admission denials, business errors, and
    /// cancellation, which are not the endpoint's fault.
    pub fn counts_as_breaker_failure(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::UpstreamError { .. })
    }
}
