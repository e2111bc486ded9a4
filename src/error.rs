//! Domain error types shared by the three programs.
//!
//! Configuration and store-integrity errors are fatal for whichever program
//! hits them; remote errors are fatal for a single puller or poster
//! invocation. The NNTP worker recovers from everything else with a 4xx/5xx
//! response and keeps the connection alive.

use std::path::PathBuf;
use thiserror::Error;

/// Startup-time configuration problems.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("HOME is not set")]
    MissingHome,

    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed catalog line {line} in {}", .path.display())]
    BadCatalogLine { path: PathBuf, line: usize },

    #[error("malformed creation date in {}", .path.display())]
    BadCreationDate { path: PathBuf },

    #[error("no such newsgroup: {0}")]
    UnknownGroup(String),

    #[error("no password stored for {0}")]
    MissingPassword(String),
}

/// Errors raised by the on-disk article store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The count/min/max triple failed validation on open. The installation
    /// is expected to remove the group directory and re-pull.
    #[error("broken index at {}", .path.display())]
    BrokenIndex { path: PathBuf },

    #[error("corrupt overview record for article {number} in {}", .path.display())]
    CorruptOverview { path: PathBuf, number: u64 },

    #[error("cannot lock {}: {errno}", .path.display())]
    Lock {
        path: PathBuf,
        errno: nix::errno::Errno,
    },

    #[error("index error at {}: {source}", .path.display())]
    Index {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    #[error("malformed article file {}", .path.display())]
    BadArticle { path: PathBuf },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors talking to the Forum.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response; carries the HTTP status line.
    #[error("{0}")]
    Status(String),

    /// Login failure extracted from the response `<title>`.
    #[error("{0}")]
    Login(String),

    /// Submission error extracted from the response error block.
    #[error("{0}")]
    Form(String),

    /// The page did not have the shape the parser expects. A human must
    /// update the parser.
    #[error("Forum changed its layout: {0}")]
    Layout(&'static str),
}
