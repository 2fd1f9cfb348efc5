// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A kind on every error, so callers can tell a caller mistake from
//    damaged storage from substrate trouble without parsing messages
// 3. A way to centralize setting a breakpoint to trap any error in the
//    system fairly soon after it's created (or at least when it's
//    propagated from a library we use back to us)
// 4. Same but for logging / emitting error messages into the tracing system

use std::borrow::Cow;

use backtrace_error::DynBacktraceError;
use tracing::error;

#[cfg(test)]
use test_log::test;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller handed us something unusable: oversize key or value,
    /// arity mismatch, malformed pattern, bad table name. Not retryable.
    InvalidInput,
    /// Stored bytes failed to decode. Not retryable.
    CorruptData,
    /// The underlying key-value substrate failed (I/O, locking). This is
    /// also the kind given to foreign errors crossing in through `?`.
    Substrate,
    /// An internal invariant did not hold; a bug in this library.
    IllegalState,
    /// A failure raised by a user-supplied callable, propagated verbatim.
    User,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    #[allow(dead_code)]
    inner: DynBacktraceError,
}

pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl std::fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::wrap(ErrorKind::Substrate, err)
    }
}

impl Error {
    pub fn wrap<E: std::error::Error + Send + Sync + 'static>(kind: ErrorKind, err: E) -> Error {
        error!(target: "trellis", "{:?}: {:?}", kind, err);
        Error {
            kind,
            inner: DynBacktraceError::from(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

fn msg(kind: ErrorKind, text: impl Into<Cow<'static, str>>) -> Error {
    Error::wrap(kind, SimpleErr(text.into()))
}

pub fn invalid_input(text: impl Into<Cow<'static, str>>) -> Error {
    msg(ErrorKind::InvalidInput, text)
}

pub fn corrupt(text: impl Into<Cow<'static, str>>) -> Error {
    msg(ErrorKind::CorruptData, text)
}

pub fn substrate(text: impl Into<Cow<'static, str>>) -> Error {
    msg(ErrorKind::Substrate, text)
}

pub fn illegal_state(text: impl Into<Cow<'static, str>>) -> Error {
    msg(ErrorKind::IllegalState, text)
}

pub fn user(text: impl Into<Cow<'static, str>>) -> Error {
    msg(ErrorKind::User, text)
}

#[test]
fn test_error_kinds() {
    assert_eq!(invalid_input("test error").kind(), ErrorKind::InvalidInput);
    assert_eq!(corrupt("test error").kind(), ErrorKind::CorruptData);
    assert_eq!(illegal_state("test error").kind(), ErrorKind::IllegalState);
    let io = std::io::Error::new(std::io::ErrorKind::Other, "disk fell off");
    assert_eq!(Error::from(io).kind(), ErrorKind::Substrate);
}
