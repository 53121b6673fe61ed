//! Error types for fb2html operations.

use thiserror::Error;

/// Errors that can end a conversion or a background load.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Malformed source encoding: {0}")]
    Encoding(String),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("The file is not an FB2 file (root element <{0}>)")]
    NotFictionBook(String),

    #[error("Load cancelled")]
    Cancelled,

    #[error("A document is already loading")]
    LoadInProgress,

    #[error("Load worker exited without a result")]
    WorkerGone,
}

pub type Result<T> = std::result::Result<T, Error>;
