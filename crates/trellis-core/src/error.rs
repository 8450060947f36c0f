//! Error taxonomy for the Trellis data layer.
//!
//! Every failure surfaced by a repository or the session manager is a
//! [`DataError`]: a stable [`ErrorKind`] (with a numeric code), a message,
//! optional structured data, and the chained store-level cause.

use std::fmt;

use thiserror::Error;

/// Boxed underlying cause carried by a [`DataError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable classification of data-layer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CouldNotCreateDb,
    CouldNotCreateConstraint,
    DbConnectionUnauthorized,
    DbConnectionFailed,
    CannotCreateNode,
    CannotMatchNode,
    CannotUpdateNode,
    CannotDeleteNode,
    InvalidProperty,
    CouldNotCreateRelationship,
    CouldNotDeleteRelationship,
    CannotCreateSession,
}

impl ErrorKind {
    /// Numeric code exposed to calling layers.
    pub fn code(self) -> u16 {
        match self {
            Self::CouldNotCreateDb => 1000,
            Self::CouldNotCreateConstraint => 1001,
            Self::DbConnectionUnauthorized => 1002,
            Self::DbConnectionFailed => 1003,
            Self::CannotCreateNode => 2000,
            Self::CannotMatchNode => 2001,
            Self::CannotUpdateNode => 2002,
            Self::CannotDeleteNode => 2003,
            Self::InvalidProperty => 2004,
            Self::CouldNotCreateRelationship => 3000,
            Self::CouldNotDeleteRelationship => 3001,
            Self::CannotCreateSession => 4000,
        }
    }

    /// The SCREAMING_SNAKE_CASE name used in logs and error payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CouldNotCreateDb => "COULD_NOT_CREATE_DB",
            Self::CouldNotCreateConstraint => "COULD_NOT_CREATE_CONSTRAINT",
            Self::DbConnectionUnauthorized => "DB_CONNECTION_UNAUTHORIZED",
            Self::DbConnectionFailed => "DB_CONNECTION_FAILED",
            Self::CannotCreateNode => "CANNOT_CREATE_NODE",
            Self::CannotMatchNode => "CANNOT_MATCH_NODE",
            Self::CannotUpdateNode => "CANNOT_UPDATE_NODE",
            Self::CannotDeleteNode => "CANNOT_DELETE_NODE",
            Self::InvalidProperty => "INVALID_PROPERTY",
            Self::CouldNotCreateRelationship => "COULD_NOT_CREATE_RELATIONSHIP",
            Self::CouldNotDeleteRelationship => "COULD_NOT_DELETE_RELATIONSHIP",
            Self::CannotCreateSession => "CANNOT_CREATE_SESSION",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned by every data-layer operation.
#[derive(Error, Debug)]
#[error("{kind} ({code}): {message}", code = .kind.code())]
pub struct DataError {
    kind: ErrorKind,
    message: String,
    data: Option<serde_json::Value>,
    #[source]
    source: Option<BoxError>,
}

impl DataError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            source: None,
        }
    }

    /// Attach structured context (e.g. the node key that failed).
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Chain the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
