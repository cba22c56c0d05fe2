use thiserror::Error;

#[derive(Error, Debug)]
pub enum FraudError {
    #[error("Malformed event payload: {0}")]
    Malformed(String),

    #[error("Alert repository error: {0}")]
    RepositoryError(String),

    #[error("Cache error: {0}")]
    CacheError(String),
}
