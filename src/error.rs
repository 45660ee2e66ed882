use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid job: {0}")]
    Validation(String),

    #[error("invalid resource spec: {0}")]
    InvalidSpec(String),

    #[error("cluster is already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
