use std::fmt;
pub use Error::*;

/// Error codes
#[non_exhaustive]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Function called with invalid arguments, e.g. zero colors or a block size larger than the image
    ValueOutOfRange,
    /// Length of the pixel data doesn't match width×height×4
    BufferSizeMismatch,
    /// Width or height is zero
    EmptyImage,
    /// Progress callback said to stop, or the job was cancelled
    Aborted,
    /// The worker thread went away without reporting a result
    InternalError,
}

/// Coarse grouping of [`Error`] codes
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The request was rejected before any processing started
    InvalidParameter,
    /// The caller stopped the run. There is no partial output.
    Cancelled,
    /// Some terrible inconsistency happened
    Internal,
}

impl Error {
    /// Whether this is a rejected request or a cancelled/failed run
    #[must_use]
    pub fn kind(self) -> ErrorKind {
        match self {
            Self::ValueOutOfRange | Self::BufferSizeMismatch | Self::EmptyImage => ErrorKind::InvalidParameter,
            Self::Aborted => ErrorKind::Cancelled,
            Self::InternalError => ErrorKind::Internal,
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    #[cold]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::ValueOutOfRange => "VALUE_OUT_OF_RANGE",
            Self::BufferSizeMismatch => "BUFFER_SIZE_MISMATCH",
            Self::EmptyImage => "EMPTY_IMAGE",
            Self::Aborted => "ABORTED",
            Self::InternalError => "INTERNAL_ERROR",
        })
    }
}

#[test]
fn kinds() {
    assert_eq!(ErrorKind::InvalidParameter, ValueOutOfRange.kind());
    assert_eq!(ErrorKind::InvalidParameter, BufferSizeMismatch.kind());
    assert_eq!(ErrorKind::InvalidParameter, EmptyImage.kind());
    assert_eq!(ErrorKind::Cancelled, Aborted.kind());
    assert_eq!(ErrorKind::Internal, InternalError.kind());
    assert_eq!("ABORTED", Aborted.to_string());
}
