//! Error type shared by the archive layer and the bulk data engine.
//!
//! Runtime conditions (I/O failures, truncated or corrupt archives, missing
//! backing files) are reported through [`ArchiveError`]. Programming errors
//! (bad lock state, realloc on a non-owned buffer, unknown lock flags) are
//! not — those trap via `assert!`/`panic!` at the call site.

use core::fmt;
use std::io;
use std::path::PathBuf;

/// Errors produced by archive operations and payload loads.
#[derive(Debug)]
pub enum ArchiveError {
    /// An underlying I/O operation failed.
    Io(io::Error),
    /// A read ran past the end of the archive.
    UnexpectedEof,
    /// The archive contents do not match what the codec expected
    /// (bad sizes, undecodable compressed stream, malformed string).
    Corrupt(String),
    /// A backing file recorded at load time could not be opened.
    MissingFile(PathBuf),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::Io(err) => write!(f, "archive I/O error: {}", err),
            ArchiveError::UnexpectedEof => write!(f, "unexpected end of archive"),
            ArchiveError::Corrupt(msg) => write!(f, "corrupt archive: {}", msg),
            ArchiveError::MissingFile(path) => {
                write!(f, "missing bulk data backing file '{}'", path.display())
            }
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArchiveError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ArchiveError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ArchiveError::UnexpectedEof
        } else {
            ArchiveError::Io(err)
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, ArchiveError>;
