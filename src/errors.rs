//! Error types for the mock server.
//!
//! These cover transport and lifecycle faults only. Per-request failures
//! (unknown handle, missing path, exhausted read) are never Rust errors:
//! they travel back to the client as SFTP status codes.

use thiserror::Error;

/// Top-level mock-server error.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH transport failure.
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Host or client key handling failure.
    #[error("key error: {0}")]
    Key(#[from] russh_keys::Error),

    /// Malformed SFTP packet from the client.
    #[error("SFTP protocol error: {0}")]
    Protocol(String),

    /// Server could not be configured or started.
    #[error("configuration error: {0}")]
    Config(String),

    /// The accept-loop task failed during teardown.
    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
