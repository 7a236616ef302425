//! The `SSH_FXP_STATUS` codes, their version availability and the
//! mapping from filesystem errors.

/// The status codes defined across protocol versions 3 to 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StatusCode {
    /// `SSH_FX_OK`.
    Ok = 0,

    /// `SSH_FX_EOF`.
    Eof = 1,

    /// `SSH_FX_NO_SUCH_FILE`.
    NoSuchFile = 2,

    /// `SSH_FX_PERMISSION_DENIED`.
    PermissionDenied = 3,

    /// `SSH_FX_FAILURE`.
    Failure = 4,

    /// `SSH_FX_BAD_MESSAGE`.
    BadMessage = 5,

    /// `SSH_FX_NO_CONNECTION`.
    NoConnection = 6,

    /// `SSH_FX_CONNECTION_LOST`.
    ConnectionLost = 7,

    /// `SSH_FX_OP_UNSUPPORTED`.
    OpUnsupported = 8,

    /// `SSH_FX_INVALID_HANDLE` (version 4+).
    InvalidHandle = 9,

    /// `SSH_FX_NO_SUCH_PATH` (version 4+).
    NoSuchPath = 10,

    /// `SSH_FX_FILE_ALREADY_EXISTS` (version 4+).
    FileAlreadyExists = 11,

    /// `SSH_FX_WRITE_PROTECT` (version 4+).
    WriteProtect = 12,

    /// `SSH_FX_LOCK_CONFLICT` (version 5+).
    LockConflict = 17,

    /// `SSH_FX_DIR_NOT_EMPTY` (version 6).
    DirNotEmpty = 18,

    /// `SSH_FX_NOT_A_DIRECTORY` (version 6).
    NotADirectory = 19,

    /// `SSH_FX_INVALID_FILENAME` (version 6).
    InvalidFilename = 20,

    /// `SSH_FX_INVALID_PARAMETER` (version 6).
    InvalidParameter = 23,

    /// `SSH_FX_BYTE_RANGE_LOCK_CONFLICT` (version 6).
    ByteRangeLockConflict = 25,

    /// `SSH_FX_NO_MATCHING_BYTE_RANGE_LOCK` (version 6).
    NoMatchingByteRangeLock = 31,
}

impl StatusCode {
    /// The protocol version that introduced the code.
    fn since(self) -> u32 {
        match self {
            Self::Ok
            | Self::Eof
            | Self::NoSuchFile
            | Self::PermissionDenied
            | Self::Failure
            | Self::BadMessage
            | Self::NoConnection
            | Self::ConnectionLost
            | Self::OpUnsupported => 3,

            Self::InvalidHandle
            | Self::NoSuchPath
            | Self::FileAlreadyExists
            | Self::WriteProtect => 4,

            Self::LockConflict => 5,

            Self::DirNotEmpty
            | Self::NotADirectory
            | Self::InvalidFilename
            | Self::InvalidParameter
            | Self::ByteRangeLockConflict
            | Self::NoMatchingByteRangeLock => 6,
        }
    }

    /// The nearest code expressible in the negotiated `version`;
    /// later codes degrade to their closest early equivalent.
    pub fn clamp(self, version: u32) -> Self {
        if version >= self.since() {
            return self;
        }

        match self {
            Self::FileAlreadyExists | Self::DirNotEmpty | Self::ByteRangeLockConflict => {
                Self::Failure
            }
            Self::NoSuchPath | Self::InvalidFilename | Self::NotADirectory => Self::NoSuchFile,
            Self::InvalidHandle => Self::Failure,
            Self::InvalidParameter => Self::BadMessage,
            Self::WriteProtect => Self::PermissionDenied,
            Self::LockConflict | Self::NoMatchingByteRangeLock => Self::Failure,
            other => other,
        }
    }

    /// The canonical human-readable message for the code.
    pub fn message(self) -> &'static str {
        match self {
            Self::Ok => "Success",
            Self::Eof => "End of file",
            Self::NoSuchFile => "No such file",
            Self::PermissionDenied => "Permission denied",
            Self::Failure => "Failure",
            Self::BadMessage => "Bad message",
            Self::NoConnection => "No connection",
            Self::ConnectionLost => "Connection lost",
            Self::OpUnsupported => "Operation unsupported",
            Self::InvalidHandle => "Invalid handle",
            Self::NoSuchPath => "No such path",
            Self::FileAlreadyExists => "File already exists",
            Self::WriteProtect => "Write protected",
            Self::LockConflict => "Lock conflict",
            Self::DirNotEmpty => "Directory not empty",
            Self::NotADirectory => "Not a directory",
            Self::InvalidFilename => "Invalid filename",
            Self::InvalidParameter => "Invalid parameter",
            Self::ByteRangeLockConflict => "Byte-range lock conflict",
            Self::NoMatchingByteRangeLock => "No matching byte-range lock",
        }
    }

    /// Map a filesystem error onto its status code, the same table
    /// every opcode answers failures through.
    pub fn from_io_error(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => Self::NoSuchFile,
            ErrorKind::PermissionDenied => Self::PermissionDenied,
            ErrorKind::AlreadyExists => Self::FileAlreadyExists,
            ErrorKind::Unsupported => Self::OpUnsupported,
            ErrorKind::InvalidInput => Self::InvalidParameter,
            _ => match err.raw_os_error() {
                Some(libc::ENOTEMPTY) => Self::DirNotEmpty,
                Some(libc::ENOTDIR) => Self::NotADirectory,
                Some(libc::EEXIST) => Self::FileAlreadyExists,
                Some(libc::EACCES) | Some(libc::EPERM) => Self::PermissionDenied,
                _ => Self::Failure,
            },
        }
    }
}

impl From<std::io::Error> for StatusCode {
    fn from(err: std::io::Error) -> Self {
        Self::from_io_error(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case(StatusCode::DirNotEmpty, 6, StatusCode::DirNotEmpty)]
    #[case(StatusCode::DirNotEmpty, 3, StatusCode::Failure)]
    #[case(StatusCode::FileAlreadyExists, 4, StatusCode::FileAlreadyExists)]
    #[case(StatusCode::FileAlreadyExists, 3, StatusCode::Failure)]
    #[case(StatusCode::NotADirectory, 3, StatusCode::NoSuchFile)]
    #[case(StatusCode::Eof, 3, StatusCode::Eof)]
    fn it_clamps_to_the_negotiated_version(
        #[case] code: StatusCode,
        #[case] version: u32,
        #[case] expected: StatusCode,
    ) {
        assert_eq!(code.clamp(version), expected);
    }

    #[test]
    fn it_maps_filesystem_errors() {
        let missing = std::fs::metadata("/definitely/not/here")
            .expect_err("The path existed out of nowhere");

        assert_eq!(StatusCode::from_io_error(&missing), StatusCode::NoSuchFile);
    }
}
