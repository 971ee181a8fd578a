//! Domain error taxonomy.
//!
//! Every failure carries an [`ErrorKind`]. Layers wrap errors on the way up
//! with [`DomainError::wrap`], which changes the message but never the
//! classification: [`DomainError::kind`] always resolves to the innermost
//! `DomainError` in the chain.

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used by every layer above the storage driver.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Closed set of failure classifications.
///
/// Discriminants are stable and may be sent across process boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorKind {
    /// Unclassified error.
    Other = 0,
    /// Invalid operation for this type of item.
    InvalidOperation = 1,
    /// Invalid argument.
    InvalidArgument = 2,
    /// Malformed request body (decode problem).
    MalformedRequest = 3,
    /// External I/O error such as network failure or an elapsed deadline.
    IO = 4,
    /// Business rule violation.
    Logic = 5,
    /// Item already exists.
    Exist = 6,
    /// Item does not exist.
    NotExist = 7,
    /// API authorization method related error.
    APIAuthorization = 8,
    /// Authentication error (incorrect password, token).
    UserCredentials = 9,
    /// Caller has no permission.
    NotPermitted = 10,
    /// Information withheld.
    Private = 11,
    /// Internal error or inconsistency.
    Internal = 12,
    /// Link target does not exist.
    BrokenLink = 13,
    /// Error from the database.
    Database = 14,
    /// Connection to the database failed or was lost.
    DatabaseConnection = 15,
    /// Connection to a remote service failed.
    RemoteConnection = 16,
    /// Input validation error.
    Validation = 17,
    /// Unanticipated error.
    Unanticipated = 18,
}

impl ErrorKind {
    /// Every kind, indexed by its stable code.
    pub const ALL: [ErrorKind; 19] = [
        ErrorKind::Other,
        ErrorKind::InvalidOperation,
        ErrorKind::InvalidArgument,
        ErrorKind::MalformedRequest,
        ErrorKind::IO,
        ErrorKind::Logic,
        ErrorKind::Exist,
        ErrorKind::NotExist,
        ErrorKind::APIAuthorization,
        ErrorKind::UserCredentials,
        ErrorKind::NotPermitted,
        ErrorKind::Private,
        ErrorKind::Internal,
        ErrorKind::BrokenLink,
        ErrorKind::Database,
        ErrorKind::DatabaseConnection,
        ErrorKind::RemoteConnection,
        ErrorKind::Validation,
        ErrorKind::Unanticipated,
    ];

    /// Returns the stable integer code of this kind.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Looks up a kind by its stable integer code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl TryFrom<u8> for ErrorKind {
    type Error = u8;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        Self::from_code(code).ok_or(code)
    }
}

/// What a [`DomainError`] wraps.
pub enum Cause {
    /// Another classified error. Classification recurses into it.
    Domain(Box<DomainError>),
    /// A lower-level error that carries no classification of its own
    /// (a driver error, a decode error, a sentinel message).
    Opaque(Box<dyn StdError + Send + Sync + 'static>),
}

impl Cause {
    /// Wraps an unclassified lower-level error.
    pub fn opaque<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Cause::Opaque(Box::new(err))
    }
}

impl From<DomainError> for Cause {
    fn from(err: DomainError) -> Self {
        Cause::Domain(Box::new(err))
    }
}

impl From<&str> for Cause {
    fn from(message: &str) -> Self {
        Cause::Opaque(message.into())
    }
}

impl From<Box<dyn StdError + Send + Sync + 'static>> for Cause {
    fn from(err: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Cause::Opaque(err)
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Domain(inner) => f.debug_tuple("Domain").field(inner).finish(),
            Cause::Opaque(inner) => f.debug_tuple("Opaque").field(&inner.to_string()).finish(),
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Domain(inner) => fmt::Display::fmt(inner, f),
            Cause::Opaque(inner) => fmt::Display::fmt(inner, f),
        }
    }
}

/// Transparent: the wrapped error stands in the chain as itself.
impl StdError for Cause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Cause::Domain(inner) => inner.source(),
            Cause::Opaque(inner) => inner.source(),
        }
    }
}

/// A classified failure with an optional nested cause.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DomainError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Cause>,
}

impl DomainError {
    /// Creates a root error with no cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Wraps `cause` with a new message.
    ///
    /// If `cause` is itself a `DomainError`, its classification keeps
    /// winning over `kind`.
    pub fn wrap(kind: ErrorKind, cause: impl Into<Cause>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    /// Returns the innermost `DomainError` of the chain.
    pub fn classify(&self) -> &DomainError {
        match &self.cause {
            Some(Cause::Domain(inner)) => inner.classify(),
            _ => self,
        }
    }

    /// Returns the classification of the chain.
    pub fn kind(&self) -> ErrorKind {
        self.classify().kind
    }

    /// Returns the kind given at this level, ignoring the cause.
    pub fn own_kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message given at this level.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the wrapped cause, if any.
    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    /// Colon-joined chain of messages from outermost to innermost, ending
    /// with the text of an opaque root cause. Meant for logs only.
    pub fn describe(&self) -> String {
        let mut out = self.message.clone();
        let mut next = self.cause.as_ref();
        while let Some(cause) = next {
            out.push_str(": ");
            match cause {
                Cause::Domain(inner) => {
                    out.push_str(&inner.message);
                    next = inner.cause.as_ref();
                }
                Cause::Opaque(inner) => {
                    out.push_str(&inner.to_string());
                    next = None;
                }
            }
        }
        out
    }
}

/// Wraps the error of a `Result` in one more layer of the chain.
pub trait WrapErr<T> {
    /// Maps `Err(e)` to `Err(DomainError::wrap(kind, e, message))`.
    fn wrap_err(self, kind: ErrorKind, message: impl Into<String>) -> Result<T>;
}

impl<T> WrapErr<T> for Result<T> {
    fn wrap_err(self, kind: ErrorKind, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| DomainError::wrap(kind, e, message))
    }
}
