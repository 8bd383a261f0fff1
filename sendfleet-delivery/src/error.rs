use sendfleet_common::StoreError;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Fatal engine faults.
///
/// Recoverable conditions (a refused reservation, an empty selector
/// pool, a failed send attempt) are ordinary control flow and never
/// appear here.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Engine not initialized: {0}")]
    NotInitialized(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
