macro_rules! def_status_codes {
    ( $( $(#[$meta:meta])* $variant:ident = $val:literal, )* ) => {
        /// Status code carried by `SSH_FXP_STATUS`.
        ///
        /// Codes above [`StatusCode::Failure`] are not part of sftp v3 but are
        /// reported by several servers, so they are kept here to give them a
        /// stable name.
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
        pub enum StatusCode {
            $( $(#[$meta])* $variant, )*

            /// Any code not listed above.
            Unknown(u32),
        }

        impl StatusCode {
            /// Convert the raw numeric status received from the server.
            pub const fn from_raw(code: u32) -> Self {
                match code {
                    $( $val => StatusCode::$variant, )*
                    code => StatusCode::Unknown(code),
                }
            }

            /// Return the numeric value used on the wire.
            pub const fn as_raw(self) -> u32 {
                match self {
                    $( StatusCode::$variant => $val, )*
                    StatusCode::Unknown(code) => code,
                }
            }
        }
    };
}

def_status_codes! {
    /// Operation succeeded.
    Ok = 0,
    /// End of file or no more directory entries.
    Eof = 1,
    NoSuchFile = 2,
    PermissionDenied = 3,
    /// Generic failure.
    Failure = 4,
    BadMessage = 5,
    NoConnection = 6,
    ConnectionLost = 7,
    OpUnsupported = 8,
    InvalidHandle = 9,
    NoSuchPath = 10,
    FileAlreadyExists = 11,
    WriteProtect = 12,
    NoMedia = 13,
    NoSpaceOnFilesystem = 14,
    QuotaExceeded = 15,
    UnknownPrincipal = 16,
    LockConflict = 17,
    DirNotEmpty = 18,
    NotADirectory = 19,
    InvalidFilename = 20,
    LinkLoop = 21,
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        Self::from_raw(code)
    }
}

/// Which of the path related statuses the server reported.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PathErrorKind {
    NoSuchFile,
    NoSuchPath,
    InvalidFilename,
}

/// Error kind derived from a non-OK sftp status.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SftpErrorKind {
    /// The server denied the operation.
    Permission,

    /// The path does not exist or cannot name a file.
    Path(PathErrorKind),

    NotConnected,

    ConnectionLost,

    /// The server does not implement the operation.
    Unsupported,

    /// Any other status, including codes this crate does not know about.
    Protocol(u32),
}

/// Translate a raw status into its error kind.
///
/// Returns `None` for `SSH_FX_OK`.
pub const fn map_status(code: u32) -> Option<SftpErrorKind> {
    use SftpErrorKind::*;

    Some(match StatusCode::from_raw(code) {
        StatusCode::Ok => return None,
        StatusCode::PermissionDenied => Permission,
        StatusCode::NoSuchFile => Path(PathErrorKind::NoSuchFile),
        StatusCode::NoSuchPath => Path(PathErrorKind::NoSuchPath),
        StatusCode::InvalidFilename => Path(PathErrorKind::InvalidFilename),
        StatusCode::NoConnection => NotConnected,
        StatusCode::ConnectionLost => ConnectionLost,
        StatusCode::OpUnsupported => Unsupported,
        _ => Protocol(code),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn ok_is_not_an_error() {
        assert_eq!(map_status(0), None);
    }

    #[test]
    fn known_table() {
        use SftpErrorKind::*;

        let expected = [
            (1, Protocol(1)),
            (2, Path(PathErrorKind::NoSuchFile)),
            (3, Permission),
            (4, Protocol(4)),
            (5, Protocol(5)),
            (6, NotConnected),
            (7, ConnectionLost),
            (8, Unsupported),
            (9, Protocol(9)),
            (10, Path(PathErrorKind::NoSuchPath)),
            (11, Protocol(11)),
            (12, Protocol(12)),
            (13, Protocol(13)),
            (14, Protocol(14)),
            (15, Protocol(15)),
            (16, Protocol(16)),
            (17, Protocol(17)),
            (18, Protocol(18)),
            (19, Protocol(19)),
            (20, Path(PathErrorKind::InvalidFilename)),
            (21, Protocol(21)),
        ];

        for (code, kind) in expected {
            assert_eq!(map_status(code), Some(kind), "status {code}");
        }
    }

    #[test]
    fn unknown_code_keeps_its_value() {
        assert_eq!(map_status(99), Some(SftpErrorKind::Protocol(99)));
        assert_eq!(map_status(u32::MAX), Some(SftpErrorKind::Protocol(u32::MAX)));
    }

    #[test]
    fn raw_conversion() {
        for code in 0..=21 {
            let status = StatusCode::from_raw(code);
            assert!(!matches!(status, StatusCode::Unknown(_)));
            assert_eq!(status.as_raw(), code);
        }

        assert_eq!(StatusCode::from(22), StatusCode::Unknown(22));
        assert_eq!(StatusCode::Unknown(22).as_raw(), 22);
        assert_eq!(StatusCode::DirNotEmpty.as_raw(), 18);
    }
}
