use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    IOError(#[from] std::io::Error),

    #[error("`{0}` not piped")]
    StreamPipeError(String),

    #[error("`{0}` reader thread panicked")]
    StreamReaderError(String),

    #[error("process cancelled")]
    Cancelled,

    #[error("process did not finish within {0:?}")]
    Timeout(Duration),
}
