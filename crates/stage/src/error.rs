/// Reasons a dispatch executor refuses a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExecuteError {
    #[error("executor is shut down")]
    Shutdown,

    #[error("executor queue is full")]
    Saturated,
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// A blocking wait (permit acquisition or flush drain) was cancelled.
    #[error("wait was cancelled")]
    Cancelled,

    /// The executor refused the batch's dispatch unit; its items are lost.
    #[error("dispatch rejected: {0}")]
    DispatchRejected(#[from] ExecuteError),

    #[error("stage is stopped")]
    Stopped,

    #[error("invalid batch options: {0}")]
    InvalidOptions(String),

    /// Raised by downstream targets that could not take a batch.
    #[error("delivery failed: {0}")]
    Delivery(String),
}
