use std::{io, net::SocketAddrV4};

use thiserror::Error;

use crate::{ChannelState, code::Reply};

/// Coarse classification of an [`FtpError`], for callers that map failures
/// onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::AsRefStr, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Protocol,
    Authentication,
    Transfer,
    InvalidInput,
}

impl ErrorKind {
    /// The HTTP status a web front end answers with for this kind of failure.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Connection | ErrorKind::Protocol | ErrorKind::Transfer => 502,
            ErrorKind::Authentication => 401,
            ErrorKind::InvalidInput => 400,
        }
    }
}

#[derive(Debug, Error)]
pub enum FtpError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl FtpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FtpError::Connection(_) => ErrorKind::Connection,
            FtpError::Protocol(_) => ErrorKind::Protocol,
            FtpError::Authentication(_) => ErrorKind::Authentication,
            FtpError::Transfer(_) => ErrorKind::Transfer,
            FtpError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Whether a fresh connection has a chance of succeeding where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FtpError::Connection(ConnectionError::SessionClosed) => false,
            FtpError::Connection(_) | FtpError::Protocol(_) => true,
            FtpError::Transfer(TransferError::Sink(_)) => false,
            FtpError::Transfer(_) => true,
            FtpError::Authentication(_) | FtpError::InvalidInput(_) => false,
        }
    }

    /// The server reply code behind this failure, when there was one.
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            FtpError::Connection(ConnectionError::Greeting(reply))
            | FtpError::Protocol(ProtocolError::UnexpectedReply { reply, .. })
            | FtpError::Transfer(TransferError::Aborted { reply, .. }) => Some(reply.code()),
            FtpError::Authentication(e) => Some(e.code),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("server refused the session: {0}")]
    Greeting(Reply),
    #[error("unreadable server greeting: {0}")]
    GreetingUnreadable(#[source] ProtocolError),
    #[error("control channel is {0}, not ready for commands")]
    NotReady(ChannelState),
    #[error("session already closed")]
    SessionClosed,
    #[error("failed to send {command}: {source}")]
    Send {
        command: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to open data connection to {advertised} (fallback {fallback:?}): {source}")]
    DataConnect {
        advertised: SocketAddrV4,
        fallback: Option<String>,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: &'static str, reply: Reply },
    #[error("malformed reply line {0:?}")]
    MalformedReply(String),
    #[error("reply line longer than {0} bytes")]
    LineTooLong(usize),
    #[error("reply exceeded {0} lines")]
    TooManyLines(usize),
    #[error("malformed passive mode reply {0:?}")]
    MalformedPassiveReply(String),
    #[error("incomplete reply ({reason}), {} line(s) received", .partial.len())]
    Incomplete {
        reason: ReadFailure,
        partial: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum ReadFailure {
    #[error("timed out")]
    TimedOut,
    #[error("connection closed")]
    Closed,
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
#[error("{stage} rejected with {code}: {message}")]
pub struct AuthenticationError {
    pub stage: &'static str,
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("data connection timed out after {received} bytes")]
    TimedOut { received: u64 },
    #[error("data connection interrupted after {received} bytes: {source}")]
    Interrupted {
        received: u64,
        #[source]
        source: io::Error,
    },
    #[error("transfer aborted by server after {received} bytes: {reply}")]
    Aborted { received: u64, reply: Reply },
    #[error("failed to write transfer data: {0}")]
    Sink(#[source] io::Error),
}

/// A listing line that could not be turned into an entry. Never escapes a listing call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected at least 9 fields, found {0}")]
    TooFewFields(usize),
    #[error("entry name {0:?} contains a path separator")]
    NameHasSeparator(String),
}
