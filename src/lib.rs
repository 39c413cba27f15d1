//! # sftp-mock-server
//!
//! In-process mock SFTP server for exercising SFTP client behavior in
//! automated tests. It accepts real SSH connections (russh transport,
//! fresh ed25519 host key per server), authenticates against a configured
//! per-user table, and emulates the remote filesystem entirely in memory —
//! no disk is ever touched.
//!
//! Spawn it with [`MockSftpServer::spawn`], point a client at
//! [`MockSftpServer::local_addr`], and tear it down with
//! [`MockSftpServer::close`]. All connections share one virtual
//! filesystem, so one client's writes are visible to another connection
//! and to test assertions via [`MockSftpServer::filesystem`].
//!
//! Supported operations: OPEN, READ, WRITE, CLOSE, STAT/LSTAT/FSTAT,
//! REMOVE, RENAME, OPENDIR, READDIR and REALPATH. Everything else answers
//! with an "operation unsupported" status, and non-sftp session requests
//! (shell, exec, pty, ...) are rejected at the channel level.
//!
//! State is process-lifetime only and there is no cross-connection
//! locking beyond a shared mutex — this is a test double, not a server
//! for production use.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handles;
pub mod listing;
pub mod protocol;
pub mod server;
pub mod session;
pub mod vfs;

pub use config::{MockServerConfig, UserAuth};
pub use errors::{Error, Result};
pub use server::MockSftpServer;
pub use session::{SftpSession, SharedFs, SharedFsRef};
