//! Errors for the vault.
//!
//! Most variants are expected, recoverable outcomes of a request:
//! - Input validation (missing or unrepresentable fields)
//! - Conflicts (duplicate username, duplicate memo key)
//! - Access (credential mismatch on a gated action)
//! - Lookups (unknown memo key)
//!
//! The I/O and codec variants come from the journal and are fatal for the
//! request that triggered them: the mutation is rolled back and the error is
//! propagated instead of being turned into a reply.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    #[error("username already exists")]
    AlreadyExists,
    #[error("key already exists")]
    KeyExists,
    #[error("access denied")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("no unused token after {0} attempts")]
    TokenExhausted(usize),
    #[error("journal i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("journal encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("journal decoding failed: {0}")]
    CsvAsync(#[from] csv_async::Error),
}

impl Error {
    /// True for failures of the durable layer. These must never be reported
    /// to a caller as an ordinary failed request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Csv(_) | Error::CsvAsync(_))
    }
}
