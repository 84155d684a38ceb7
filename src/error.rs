//! Error types for yangkit
//!
//! This module defines all error types used throughout the library.
//! Schema errors follow the YANG compiler taxonomy (syntax, unresolved
//! reference, circular reference, constraint, duplicate, incompatible
//! target); instance data failures are reported as [`ValidationError`].

use std::fmt;
use thiserror::Error;

use crate::statement::SourcePos;

/// Result type alias using yangkit Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for yangkit operations
#[derive(Error, Debug)]
pub enum Error {
    /// A single schema error
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Compilation of a module failed
    #[error("compilation of module '{module}' failed: {}", first_message(.errors))]
    Compile {
        /// Name of the module whose compilation was aborted
        module: String,
        /// Collected errors, the first one is the cause of the abort
        errors: Vec<SchemaError>,
    },

    /// Instance data validation error
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Feature could not be enabled
    #[error("feature denied: {0}")]
    Denied(String),

    /// Lookup failed
    #[error("not found: {0}")]
    NotFound(String),

    /// XPath parse or evaluation error
    #[error("XPath error: {0}")]
    XPath(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn first_message(errors: &[SchemaError]) -> String {
    errors
        .first()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

impl Error {
    /// Schema error kind of this error, looking through `Compile` wrappers
    pub fn schema_kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Schema(e) => Some(e.kind),
            Error::Compile { errors, .. } => errors.first().map(|e| e.kind),
            _ => None,
        }
    }

    /// All schema errors carried by this error
    pub fn schema_errors(&self) -> Vec<&SchemaError> {
        match self {
            Error::Schema(e) => vec![e],
            Error::Compile { errors, .. } => errors.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Validation error carried by this error, if any
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

/// Error taxonomy shared by schema compilation and data validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed statement argument (bad date, identifier, number, ...)
    SyntaxViolation,
    /// Type, grouping, feature, identity, leafref or schema-node-id not found
    UnresolvedReference,
    /// Type, uses, identity or feature cycle
    CircularReference,
    /// Narrowing, cardinality, mandatory-vs-default, status or data rule violated
    ConstraintViolation,
    /// Name, value or position collision
    DuplicateDefinition,
    /// Refine, augment or deviation applied to a node kind that disallows it
    IncompatibleTarget,
}

impl ErrorKind {
    /// Get the kind as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SyntaxViolation => "syntax violation",
            ErrorKind::UnresolvedReference => "unresolved reference",
            ErrorKind::CircularReference => "circular reference",
            ErrorKind::ConstraintViolation => "constraint violation",
            ErrorKind::DuplicateDefinition => "duplicate definition",
            ErrorKind::IncompatibleTarget => "incompatible target",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema compilation error with context
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    /// Error category
    pub kind: ErrorKind,
    /// Error message
    pub message: String,
    /// Module being compiled
    pub module: Option<String>,
    /// Schema path of the offending node
    pub path: Option<String>,
    /// Position of the offending statement
    pub position: Option<SourcePos>,
}

impl SchemaError {
    /// Create a new schema error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            module: None,
            path: None,
            position: None,
        }
    }

    /// Shorthand for a syntax violation
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxViolation, message)
    }

    /// Shorthand for an unresolved reference
    pub fn unresolved(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnresolvedReference, message)
    }

    /// Shorthand for a circular reference
    pub fn circular(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CircularReference, message)
    }

    /// Shorthand for a constraint violation
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConstraintViolation, message)
    }

    /// Shorthand for a duplicate definition
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateDefinition, message)
    }

    /// Shorthand for an incompatible target
    pub fn incompatible(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IncompatibleTarget, message)
    }

    /// Set the module name
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Set the schema path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the source position, keeping an already recorded one
    pub fn with_position(mut self, position: SourcePos) -> Self {
        if self.position.is_none() {
            self.position = Some(position);
        }
        self
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;

        if let Some(ref path) = self.path {
            write!(f, " (path {})", path)?;
        }

        if let Some(ref module) = self.module {
            write!(f, " [module {}]", module)?;
        }

        if let Some(ref pos) = self.position {
            write!(f, " at {}", pos)?;
        }

        Ok(())
    }
}

impl std::error::Error for SchemaError {}

/// Instance data validation error with context
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category
    pub kind: ErrorKind,
    /// Error message
    pub message: String,
    /// Path of the offending data node
    pub data_path: Option<String>,
    /// Path of the schema node of the offending data node
    pub schema_path: Option<String>,
    /// `error-app-tag` of a failed `must`
    pub app_tag: Option<String>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data_path: None,
            schema_path: None,
            app_tag: None,
        }
    }

    /// Set the data path
    pub fn with_data_path(mut self, path: impl Into<String>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    /// Set the schema path
    pub fn with_schema_path(mut self, path: impl Into<String>) -> Self {
        self.schema_path = Some(path.into());
        self
    }

    /// Set the application tag
    pub fn with_app_tag(mut self, tag: impl Into<String>) -> Self {
        self.app_tag = Some(tag.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref path) = self.data_path {
            write!(f, "\n\nData path: {}", path)?;
        }

        if let Some(ref path) = self.schema_path {
            write!(f, "\n\nSchema path: {}", path)?;
        }

        if let Some(ref tag) = self.app_tag {
            write!(f, "\n\nApp tag: {}", tag)?;
        }

        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new(ErrorKind::ConstraintViolation, "Duplicate instance of 'l'")
            .with_data_path("/m:l[name='a']")
            .with_schema_path("/m:l")
            .with_app_tag("dup");

        let msg = format!("{}", err);
        assert!(msg.contains("Duplicate instance of 'l'"));
        assert!(msg.contains("Data path:"));
        assert!(msg.contains("Schema path:"));
        assert!(msg.contains("App tag:"));
    }

    #[test]
    fn test_schema_error_display() {
        let err = SchemaError::circular("identity 'i1' derives from itself")
            .with_module("m")
            .with_position(SourcePos::new(3, 5));

        let msg = format!("{}", err);
        assert!(msg.starts_with("circular reference"));
        assert!(msg.contains("[module m]"));
        assert!(msg.contains("3:5"));
    }

    #[test]
    fn test_position_is_kept() {
        let err = SchemaError::syntax("bad")
            .with_position(SourcePos::new(1, 1))
            .with_position(SourcePos::new(9, 9));
        assert_eq!(err.position, Some(SourcePos::new(1, 1)));
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = SchemaError::duplicate("x").into();
        assert_eq!(err.schema_kind(), Some(ErrorKind::DuplicateDefinition));

        let err = Error::Compile {
            module: "m".into(),
            errors: vec![SchemaError::constraint("y")],
        };
        assert_eq!(err.schema_kind(), Some(ErrorKind::ConstraintViolation));
        assert!(err.to_string().contains("module 'm'"));
    }
}
