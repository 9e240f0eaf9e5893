#![forbid(unsafe_code)]

mod channel;
mod codec;
mod connection;
mod extensions;
mod file_attrs;
mod request;
mod response;

pub mod constants;

/// Default size of buffer for up/download in openssh-portable
pub const OPENSSH_PORTABLE_DEFAULT_COPY_BUFLEN: usize = 32768;

/// Minimum amount of data to read at a time in openssh-portable
pub const OPENSSH_PORTABLE_MIN_READ_SIZE: usize = 512;

/// Default length of download buffer in openssh-portable
pub const OPENSSH_PORTABLE_DEFAULT_DOWNLOAD_BUFLEN: usize = 20480;

/// Default length of upload buffer in openssh-portable
pub const OPENSSH_PORTABLE_DEFAULT_UPLOAD_BUFLEN: usize = 20480;

pub use ssh_sftp_error::{
    map_status, Error, ErrorCategory, PathErrorKind, SftpErrorKind, StatusCode, TransportError,
};

pub use channel::Channel;
pub use connection::{Connection, Id};
pub use extensions::Extensions;
pub use file_attrs::{FileAttrs, FileAttrsFlags, FileType, Permissions};
pub use request::{OpenFlags, RenameFlags};
pub use response::{HandleOwned, NameEntry};
