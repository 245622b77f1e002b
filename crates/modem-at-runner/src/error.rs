//! Runner error type.

use thiserror::Error;

use modem_at::AtError;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("engine error: {0}")]
    Engine(#[from] AtError),

    #[error("invalid command table: {0}")]
    Table(String),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
