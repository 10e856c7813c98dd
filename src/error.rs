use thiserror::Error;

// Closed set of failures any part of the package pipeline can report.
//
// Authentication is deliberately a unit variant: a bad password and a
// tampered index blob must look identical to the caller.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("malformed package: {0}")]
    Format(String),
    #[error("integrity check failed (expected {expected}, computed {computed})")]
    Integrity { expected: String, computed: String },
    #[error("authentication failed: wrong password or corrupted index")]
    Authentication,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("build cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    pub fn format<S: Into<String>>(msg: S) -> Self {
        Error::Format(msg.into())
    }
}
