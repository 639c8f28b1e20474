//! Proxy-wide error type (§7). Every fallible boundary carries a typed
//! `ErrorKind` plus an optional wrapped cause, following the `Context`
//! pattern used elsewhere in this codebase.

use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Debug, Display};

pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
    /// Missing or invalid configuration; always fatal at startup (§7).
    #[fail(display = "configuration: {}", _0)]
    Config(String),

    /// RPC timeout, decode error, or other recoverable upstream failure.
    #[fail(display = "upstream transient error ({}): {}", _0, _1)]
    UpstreamTransient(String, String),

    /// The node rejected a submission outright (bad seal, unknown level).
    #[fail(display = "upstream rejected submission: {}", _0)]
    UpstreamRejected(String),

    /// Oversize line or malformed JSON on a stratum connection.
    #[fail(display = "session protocol violation: {}", _0)]
    SessionProtocol(String),

    /// Banned IP, bad login, rate limit.
    #[fail(display = "session rejected by policy: {}", _0)]
    SessionPolicy(String),

    /// Bad job id, bad nonce, stale submission, verification failure.
    #[fail(display = "submission rejected: {}", _0)]
    Submission(String),

    /// Failed to deliver a frame to a session during broadcast.
    #[fail(display = "broadcast write failed: {}", _0)]
    Broadcast(String),

    #[fail(display = "I/O error: {}", _0)]
    Io(String),
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Debug::fmt(&self.inner, f)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.inner.get_context().clone()
    }

    /// Errors from §7's "Upstream transient" row do not propagate past the
    /// ingest loop; everything else that reaches the top is either fatal
    /// startup (handled directly in `main`) or already converted to a
    /// stratum error response by the session handler.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::UpstreamTransient(_, _))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Self {
        Self { inner }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        let msg = e.to_string();
        Self {
            inner: e.context(ErrorKind::Io(msg)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
