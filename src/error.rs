//! Common error type for this crate.

use std::borrow::Cow;

#[derive(Debug)]
pub enum Error {
    /// An underlying read or write failure.
    Io(std::io::Error),
    /// A parser-combinator failure that doesn't map to a more specific variant.
    Nom(nom::error::Error<Vec<u8>>),
    /// Invalid UTF-8 in a title, id or name section.
    Utf8(std::str::Utf8Error),
    /// The input ended before a required field or section completed.
    Truncated,
    /// A structural violation of the archive format.
    Corrupt(Cow<'static, str>),
    /// The archive's format version is not supported by this decoder.
    UnsupportedVersion(u8),
    /// The requested projection cannot be satisfied by this archive.
    UnsupportedProjection(&'static str),
    /// An invalid command-line configuration (CLI layer only).
    Config(String),
}

impl Error {
    pub fn corrupt<S: Into<Cow<'static, str>>>(message: S) -> Self {
        Error::Corrupt(message.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Truncated
        } else {
            Error::Io(error)
        }
    }
}

impl From<nom::error::Error<Vec<u8>>> for Error {
    fn from(error: nom::error::Error<Vec<u8>>) -> Self {
        Error::Nom(error)
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(error: std::string::FromUtf8Error) -> Self {
        Self::from(error.utf8_error())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(error: std::str::Utf8Error) -> Self {
        Error::Utf8(error)
    }
}

impl<'i> From<nom::error::Error<&'i [u8]>> for Error {
    fn from(error: nom::error::Error<&'i [u8]>) -> Self {
        if error.code == nom::error::ErrorKind::TooLarge {
            Error::corrupt("varint overflows 64 bits")
        } else {
            Error::Nom(nom::error::Error::new(error.input.to_owned(), error.code))
        }
    }
}

impl<E> From<nom::Err<E>> for Error
where
    E: Into<Error>,
{
    fn from(error: nom::Err<E>) -> Self {
        match error {
            nom::Err::Error(e) | nom::Err::Failure(e) => e.into(),
            nom::Err::Incomplete(_) => Error::Truncated,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => e.fmt(f),
            Error::Nom(e) => nom::Err::Error(e).fmt(f),
            Error::Utf8(e) => e.fmt(f),
            Error::Truncated => f.write_str("archive ended before expected"),
            Error::Corrupt(message) => write!(f, "corrupt archive: {message}"),
            Error::UnsupportedVersion(v) => write!(f, "unsupported format version: {v}"),
            Error::UnsupportedProjection(p) => {
                write!(f, "archive does not support the `{p}` projection")
            }
            Error::Config(message) => write!(f, "invalid configuration: {message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Utf8(e) => Some(e),
            _ => None,
        }
    }
}
