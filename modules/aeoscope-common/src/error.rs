use thiserror::Error;

#[derive(Error, Debug)]
pub enum AeoscopeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Search provider error: {0}")]
    Search(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
