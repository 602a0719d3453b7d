use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("request id {0:?} is already tracked")]
    Duplicate(String),
}

/// Synchronous failures of a dispatch. Upstream failures never show up here;
/// they surface as an `error` job status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("request id {0:?} is already in use")]
    DuplicateRequest(String),

    #[error("job queue is full")]
    QueueFull,

    #[error("worker pool is shut down")]
    ShutDown,
}

impl From<RegistryError> for DispatchError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Duplicate(id) => DispatchError::DuplicateRequest(id),
        }
    }
}
