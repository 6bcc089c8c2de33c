use thiserror::Error;

/// Closed error taxonomy matching the policy table in SPEC_FULL §7.
///
/// Workers match on this to decide retry vs. DLQ vs. swallow-and-log instead
/// of string-sniffing an opaque error.
#[derive(Error, Debug)]
pub enum AppError {
    /// DB connection reset, transport leader unavailable, etc. Retried with
    /// backoff by the retry executor; DLQ'd on exhaustion.
    #[error("transient infrastructure error: {0}")]
    Transient(#[source] anyhow::Error),

    /// Malformed event body, missing referenced student/course. No retry;
    /// immediate DLQ.
    #[error("poison input: {0}")]
    Poison(String),

    /// Trainer directory returned no eligible candidates, or all candidates
    /// were capped. Not an error in the operational sense: the allocation is
    /// written as WAITLISTED and an event is still emitted.
    #[error("no eligible trainer: {0}")]
    Waitlisted(String),

    /// Cache invalidation failure, best-effort event emission failure.
    /// Logged at WARN; the driving message is still ACKed.
    #[error("best-effort side effect failed: {0}")]
    BestEffort(#[source] anyhow::Error),

    /// Refresh-lock contention exceeded the bounded wait.
    #[error("refresh lock contention")]
    RefreshConflict,

    /// Refresh token revoked or expired inside the locked transaction.
    #[error("refresh token stale or revoked")]
    RefreshStale,

    #[error("reservation failed: {0}")]
    ReservationFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the retry executor should retry this error (vs. DLQ immediately).
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }

    /// Wraps any infra-layer error (DB, cache, HTTP) as `Transient` for `map_err`.
    pub fn transient(e: impl Into<anyhow::Error>) -> Self {
        AppError::Transient(e.into())
    }

    /// Wraps a best-effort side effect's failure for `map_err`.
    pub fn best_effort(e: impl Into<anyhow::Error>) -> Self {
        AppError::BestEffort(e.into())
    }

    /// Whether the worker loop should log-and-ACK instead of routing to the
    /// DLQ (cache invalidation, best-effort event emission — §4.3, §4.9).
    pub fn is_best_effort(&self) -> bool {
        matches!(self, AppError::BestEffort(_))
    }
}
