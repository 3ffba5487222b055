//! ftpbrowse is a small, read-only FTP client for browsing directories and
//! downloading files from conventional Unix-style servers in passive mode.
//!
//! every high-level call runs on its own control connection:
//! connect, log in, list or retrieve, quit. transient failures are retried
//! once on a fresh connection (see [`RetryPolicy`]).

pub mod auth;
pub mod code;
pub mod command;
pub mod listing;
pub mod passive;
pub mod transfer;

#[cfg(feature = "tcp")]
pub mod tcp;

mod builder;
mod connector;
mod control;
mod error;
mod profile;
mod session;

pub use builder::*;
pub use connector::*;
pub use control::*;
pub use error::*;
pub use listing::{DirectoryEntry, EntryKind};
pub use passive::DataConnection;
pub use profile::*;
pub use session::*;

pub mod io {
    pub use futures::io::{AsyncRead, AsyncWrite};

    #[cfg(feature = "tcp")]
    pub use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
}

/// Lists `path` on the server described by `profile`, over plain TCP.
#[cfg(feature = "tcp")]
pub async fn list_directory(
    profile: &ServerProfile,
    path: &str,
) -> Result<Vec<DirectoryEntry>, FtpError> {
    FtpSession::new(profile.clone(), tcp::TcpConnector)
        .list(path)
        .await
}

/// Downloads the file at `path` into memory, over plain TCP.
#[cfg(feature = "tcp")]
pub async fn download_file(profile: &ServerProfile, path: &str) -> Result<Vec<u8>, FtpError> {
    FtpSession::new(profile.clone(), tcp::TcpConnector)
        .download(path)
        .await
}
