use std::{error, fmt, io};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds a command or backend can report.
///
/// "Would block" is deliberately not here: needing more [`process`] or
/// [`event_raised`] calls is a normal outcome, reported as
/// [`Progress::Blocked`].
///
/// [`process`]: crate::Burrow::process
/// [`event_raised`]: crate::Burrow::event_raised
/// [`Progress::Blocked`]: crate::Progress::Blocked
#[derive(Debug)]
pub enum Error {
    /// A required parameter was empty, or an option key was not recognized.
    /// Carries the name of the offending parameter or key.
    InvalidArgument(&'static str),
    /// A command was issued while another command was still in flight.
    InProgress,
    /// The internal poll reached the handle's configured timeout; the
    /// current command has been canceled.
    TimedOut,
    /// The HTTP transport failed, the server answered with an error status,
    /// or its response could not be parsed.
    Server(String),
    /// An allocation or OS resource request failed.
    OutOfMemory,
    /// A singular get or update named an account, queue, or message that
    /// does not exist.
    NotFound,
    /// A backend invariant was violated. Logged at error level when raised.
    Internal,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(what) => {
                write!(f, "invalid argument: {what}")
            },
            Error::InProgress => write!(f, "a command is already in progress"),
            Error::TimedOut => write!(f, "timed out waiting for i/o"),
            Error::Server(msg) => write!(f, "server error: {msg}"),
            Error::OutOfMemory => write!(f, "out of memory"),
            Error::NotFound => write!(f, "no such entity"),
            Error::Internal => write!(f, "internal error"),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::OutOfMemory => Self::OutOfMemory,
            _ => Self::Server(value.to_string()),
        }
    }
}
