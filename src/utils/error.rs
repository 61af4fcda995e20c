use thiserror::Error;

#[derive(Debug, Error)]
pub enum SockPoolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SockPoolError>;
