#![forbid(unsafe_code)]

use std::{io, num::TryFromIntError};

use thiserror::Error as ThisError;

mod status;
pub use status::{map_status, PathErrorKind, SftpErrorKind, StatusCode};

/// Error reported by the transport itself, as opposed to an sftp status.
#[derive(Debug, Clone, Eq, PartialEq, ThisError)]
#[error("transport error {code}: {message}")]
pub struct TransportError {
    /// Transport specific error code.
    pub code: i32,
    /// Human readable description provided by the transport.
    pub message: Box<str>,
}

impl TransportError {
    pub fn new(code: i32, message: impl Into<Box<str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Broad classification of [`Error`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorCategory {
    /// Not connected, not authenticated, connection lost or no connection.
    Connection,
    /// Handle not opened, already closed or used as the wrong kind.
    Handle,
    /// No such file, no such path or invalid filename.
    Path,
    Permission,
    /// Operation, open mode or extension not supported.
    Unsupported,
    /// Any other sftp status, or a malformed response.
    Protocol,
    /// Failure of the underlying transport.
    Transport,
    /// Local IO failure.
    Io,
}

/// Error returned by
/// [`ssh-sftp-client-lowlevel`](https://docs.rs/ssh-sftp-client-lowlevel)
/// and [`ssh-sftp-client`](https://docs.rs/ssh-sftp-client)
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum Error {
    /// The session is not connected, or the transport is no longer alive.
    #[error("Sftp session is not connected.")]
    NotConnected,

    /// The transport has not finished authentication.
    #[error("Transport is not authenticated.")]
    NotAuthenticated,

    /// The handle has not been opened.
    #[error("Handle not opened.")]
    HandleNotOpened,

    /// The handle has been closed and cannot be reopened.
    #[error("Handle is closed.")]
    HandleClosed,

    /// A file operation was issued on a directory handle.
    #[error("Handle is not a file.")]
    NotAFile,

    /// A directory operation was issued on a file handle.
    #[error("Handle is not a directory.")]
    NotADirectory,

    /// Reached end of file while a line was required.
    #[error("End of file reached.")]
    UnexpectedEof,

    /// The open mode string is not one of `"" "r" "r+" "w" "w+" "a" "a+"`.
    #[error("Unsupported open mode {0:?}.")]
    UnsupportedOpenMode(Box<str>),

    /// The server does not advertise the extension.
    #[error("Unsupported extension {0}.")]
    UnsupportedExtension(&'static &'static str),

    /// Server speaks sftp protocol other than protocol 3.
    #[error("Server does not support sftp protocol v3: It only support sftp protocol newer than {version}.")]
    UnsupportedSftpProtocol {
        /// The sftp protocol version the server replied with.
        version: u32,
    },

    /// Sftp server error
    #[error("Sftp server reported error kind {kind:?} (status {code}), msg: {msg}")]
    SftpError {
        kind: SftpErrorKind,
        /// Raw status code
        code: u32,
        msg: Box<str>,
    },

    /// The transport failed.
    #[error("{error}")]
    Transport {
        error: TransportError,
        #[source]
        source: Option<io::Error>,
    },

    /// IO Error (Excluding [`io::ErrorKind::WouldBlock`]): {0}.
    #[error("IO Error (Excluding `io::ErrorKind::WouldBlock`): {0}.")]
    IOError(#[from] io::Error),

    /// Sftp protocol can only send and receive at most [`u32::MAX`] data in one request.
    #[error("Sftp protocol can only send and receive at most u32::MAX data in one request.")]
    BufferTooLong(#[from] TryFromIntError),

    /// The response id is invalid.
    #[error("The response id {response_id} is invalid.")]
    InvalidResponseId {
        /// The invalid response id
        response_id: u32,
    },

    /// Invalid response from the sftp-server
    #[error("Response from sftp server is invalid: {0}")]
    InvalidResponse(
        // Use `&&str` since `&str` takes 16 bytes while `&str` only takes 8 bytes.
        &'static &'static str,
    ),

    /// Handle returned by server is longer than the limit 256 bytes specified in sftp v3.
    #[error("Handle returned by server is longer than the limit 256 bytes specified in sftp v3")]
    HandleTooLong,
}

impl Error {
    /// Build the error for a non-OK status.
    ///
    /// Returns `None` if `code` is `SSH_FX_OK`.
    pub fn from_status(code: u32, msg: impl Into<Box<str>>) -> Option<Self> {
        map_status(code).map(|kind| Error::SftpError {
            kind,
            code,
            msg: msg.into(),
        })
    }

    pub fn category(&self) -> ErrorCategory {
        use Error::*;

        match self {
            NotConnected | NotAuthenticated => ErrorCategory::Connection,
            HandleNotOpened | HandleClosed | NotAFile | NotADirectory | UnexpectedEof => {
                ErrorCategory::Handle
            }
            UnsupportedOpenMode(_) | UnsupportedExtension(_) => ErrorCategory::Unsupported,
            SftpError { kind, .. } => match kind {
                SftpErrorKind::Permission => ErrorCategory::Permission,
                SftpErrorKind::Path(_) => ErrorCategory::Path,
                SftpErrorKind::NotConnected | SftpErrorKind::ConnectionLost => {
                    ErrorCategory::Connection
                }
                SftpErrorKind::Unsupported => ErrorCategory::Unsupported,
                SftpErrorKind::Protocol(_) => ErrorCategory::Protocol,
            },
            UnsupportedSftpProtocol { .. }
            | BufferTooLong(_)
            | InvalidResponseId { .. }
            | InvalidResponse(_)
            | HandleTooLong => ErrorCategory::Protocol,
            Transport { .. } => ErrorCategory::Transport,
            IOError(_) => ErrorCategory::Io,
        }
    }

    /// Raw sftp status, if this error was produced by one.
    pub fn status_code(&self) -> Option<u32> {
        match self {
            Error::SftpError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Kind of the sftp status, if this error was produced by one.
    pub fn sftp_kind(&self) -> Option<SftpErrorKind> {
        match self {
            Error::SftpError { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
