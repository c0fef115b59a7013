pub mod identity;
pub mod notify;
pub mod payment;

/// Failure taxonomy shared across the engine. Every module-local error is
/// folded into one of these variants at the lifecycle-engine or API boundary.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested transition is not legal from the record's current state
    /// (wrong status, departure already past, malformed seat/passenger data).
    /// Surfaced immediately; the caller must correct or abandon.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Applying an inventory adjustment would break the seat-count invariant.
    /// Fatal internal error: the atomic unit aborts and nothing is written.
    #[error("inventory consistency violated: {0}")]
    InventoryConsistency(String),

    /// Network or gateway I/O failure. Retried with bounded backoff before
    /// being surfaced; safe for the caller to retry.
    #[error("transient I/O failure: {0}")]
    Transient(String),

    /// The payment provider declined the request.
    #[error("gateway rejected: {0}")]
    GatewayRejected(String),

    /// An optimistic commit lost a version race. The engine re-reads and
    /// retries; surfaced only once the attempt budget is exhausted.
    #[error("commit conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Whether the caller may usefully retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_) | CoreError::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(CoreError::Transient("timeout".into()).is_retryable());
        assert!(CoreError::Conflict("version".into()).is_retryable());
        assert!(!CoreError::NotFound("booking".into()).is_retryable());
        assert!(!CoreError::Precondition("departed".into()).is_retryable());
    }
}
