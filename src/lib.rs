//! sftp v3 client running on a non-blocking ssh [`Transport`].
//!
//! A [`Session`] binds the sftp subsystem to an authenticated transport,
//! and [`Handle`]s opened through it read and write remote files and
//! directories. Whenever the transport would block, the pending operation
//! waits for [`Transport::wait_until_ready`] and retries.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use ssh_sftp_client_lowlevel as lowlevel;

pub use ssh_sftp_error::{
    map_status, Error, ErrorCategory, PathErrorKind, SftpErrorKind, StatusCode, TransportError,
};

pub use lowlevel::{Channel, Extensions, RenameFlags};

mod options;
pub use options::SftpOptions;

mod transport;
pub use transport::{Transport, WaitUntilReady};

mod unix_timestamp;
pub use unix_timestamp::UnixTimeStamp;

mod metadata;
pub use metadata::{FileType, MetaData, MetaDataBuilder, Permissions};

mod open_mode;

mod session;
pub use session::{Session, DEFAULT_MKDIR_MODE};

mod handle;
pub use handle::{Handle, HandleKind, ReadMode, ReadOptions, Whence, DEFAULT_OPEN_PERM};

mod dir;
pub use dir::{Dir, DirEntry};

mod file_factory;
pub use file_factory::FileFactory;
