//! Error type shared by every crate in the workspace.

use std::fmt;

pub type Result<T, E = WeftError> = std::result::Result<T, E>;

/// Broad classification of an error.
///
/// Kinds are part of the public contract: callers branch on them to decide
/// whether a failure is a misconfiguration, bad data, or a programming error,
/// without matching on message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid entry in the execution environment context.
    Config,
    /// Malformed or truncated input data, distinct from a clean end of input.
    Data,
    /// Bad argument to an operation (mismatched lengths, out-of-range index).
    InvalidArgument,
    /// Operation not supported for the given type.
    Unsupported,
    /// Operation invoked outside the state it's valid in.
    IllegalState,
    /// Failure reserving, writing to, or releasing an exchange channel.
    Channel,
    /// Underlying I/O failure.
    Io,
    /// Execution was cancelled.
    Cancelled,
    /// Code path not yet implemented.
    NotImplemented,
    /// Catch-all for internal invariant violations.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Data => "data",
            Self::InvalidArgument => "invalid argument",
            Self::Unsupported => "unsupported",
            Self::IllegalState => "illegal state",
            Self::Channel => "channel",
            Self::Io => "io",
            Self::Cancelled => "cancelled",
            Self::NotImplemented => "not implemented",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
pub struct WeftError {
    kind: ErrorKind,
    msg: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl WeftError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Internal, msg)
    }

    pub fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        WeftError {
            kind,
            msg: msg.into(),
            source: None,
        }
    }

    pub fn with_source(
        msg: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        WeftError {
            kind: ErrorKind::Internal,
            msg: msg.into(),
            source: Some(source),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Config, msg)
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Data, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::InvalidArgument, msg)
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Unsupported, msg)
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::IllegalState, msg)
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Channel, msg)
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Cancelled, msg)
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Attach a source error, keeping the existing kind.
    pub fn wrap(mut self, source: Box<dyn std::error::Error + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Display for WeftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for WeftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<std::io::Error> for WeftError {
    fn from(err: std::io::Error) -> Self {
        WeftError {
            kind: ErrorKind::Io,
            msg: "io error".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

pub trait ResultExt<T> {
    /// Wrap an error with additional context.
    fn context(self, msg: &'static str) -> Result<T>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| WeftError::with_source(msg, Box::new(e)))
    }
}

pub trait OptionExt<T> {
    /// Unwrap an option, erroring with a message naming the missing field.
    fn required(self, field: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, field: &'static str) -> Result<T> {
        match self {
            Some(v) => Ok(v),
            None => Err(WeftError::new(format!("Missing required field: {field}"))),
        }
    }
}

#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        return Err($crate::WeftError::with_kind(
            $crate::ErrorKind::NotImplemented,
            format!("Not yet implemented: {msg}"),
        ));
    }};
}
