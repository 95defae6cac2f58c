//! Error types for the operation engine.
//!
//! This module defines one error type per concern:
//!
//! - [`ValidationError`] - Configuration document faults (always fatal, reported before any API call)
//! - [`ClientError`] - API collaborator failures (authentication, request, credentials)
//! - [`GenerateError`] - Failures while turning validated settings into request parameters
//! - [`OperationError`] - Top-level errors raised by an operation run
//! - [`LoadError`] - Reading a configuration document from disk
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::fmt;
use thiserror::Error;

// =============================================================================
// Document Location
// =============================================================================

/// Where in the configuration document a fault was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// A named top-level section ("Main", "Default Settings").
    Section(&'static str),
    /// An entry of the "Iterations" section (0-based internally, printed 1-based).
    Iteration(usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Section(name) => write!(f, "\"{}\" section", name),
            Location::Iteration(idx) => write!(f, "iteration #{}", idx + 1),
        }
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Faults in the configuration document.
///
/// Validation stops at the first fault, so a run only ever reports one of these.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// The document root is not a map of sections.
    #[error("Input is not valid")]
    NotADocument,

    /// A mandatory section is absent.
    #[error("\"{0}\" section not found")]
    MissingSection(&'static str),

    /// A section has the wrong shape (not a map, not a list).
    #[error("\"{0}\" section is not valid")]
    InvalidSection(&'static str),

    /// A section the operation does not take.
    #[error("Unexpected section \"{section}\", only {expected} expected")]
    UnexpectedSection { section: String, expected: &'static str },

    /// `Main.Operation` does not name a catalogued operation.
    #[error("Invalid value for \"Operation\" property in \"Main\" section")]
    UnknownOperation(String),

    /// A property that the applicable mapping does not declare.
    #[error("Unrecognized property \"{property}\" in {location}")]
    UnknownProperty { location: Location, property: String },

    /// A property whose value fails its rule.
    #[error("Invalid value for \"{property}\" property in {location}{}", reason.as_ref().map(|r| format!(": {}", r)).unwrap_or_default())]
    InvalidProperty {
        location: Location,
        property: String,
        reason: Option<String>,
    },

    /// A required property is absent.
    #[error("{location} does not contain the required property \"{property}\"")]
    MissingProperty { location: Location, property: String },

    /// An "Iterations" entry that is not a map.
    #[error("Iteration #{} is not valid", .0 + 1)]
    InvalidIteration(usize),

    /// A whole-section constraint (e.g. exactly one identifier list).
    #[error("\"{section}\" section {message}")]
    Constraint { section: &'static str, message: String },
}

// =============================================================================
// Client Errors
// =============================================================================

/// Failures reported by the API collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// Authentication was refused.
    #[error("API authentication failed{}", if .0.is_empty() { String::new() } else { format!(": {}", .0) })]
    Auth(String),

    /// A request failed (transport or non-success status).
    #[error("API request failed{}", if .0.is_empty() { String::new() } else { format!(": {}", .0) })]
    Request(String),

    /// API credentials are not configured.
    #[error("Missing API credentials: {0}")]
    Credentials(String),

    /// The server answered with a body that is not JSON.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

// =============================================================================
// Parameter Generation Errors
// =============================================================================

/// Failures while generating request parameters from validated settings.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerateError {
    /// A transform produced no value.
    #[error("Unable to resolve a value for \"{property}\"")]
    Unresolved { property: String },

    /// The screen was given as an identifier and also through screen sub-fields.
    #[error("Invalid screen (mixing definition and ID)")]
    ScreenConflict,

    /// A transform needed the API and the call failed.
    #[error(transparent)]
    Client(#[from] ClientError),
}

// =============================================================================
// Operation Errors (top-level)
// =============================================================================

/// Errors surfaced while building or running an operation.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The document did not validate.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Default parameters could not be generated.
    #[error(transparent)]
    Generate(#[from] GenerateError),

    /// The API collaborator failed outside an iteration.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A response did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Malformed(String),

    /// Any other fault in the engine itself.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Document Loading Errors
// =============================================================================

/// Errors while reading a configuration document.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Failed to read file.
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),

    /// YAML syntax error.
    #[error("Invalid YAML document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON syntax error.
    #[error("Invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown file extension.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for document validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type for API calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type for parameter generation.
pub type GenerateResult<T> = Result<T, GenerateError>;

/// Result type for operation runs.
pub type OperationResult<T> = Result<T, OperationError>;
