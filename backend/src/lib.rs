//! # p123ops - declarative Portfolio123 operations
//!
//! A configuration document names one operation (screen backtests, rank
//! performance, data downloads, rank snapshots, ...) with its default
//! settings and optional iterations. The crate validates the document
//! against a field mapping registry, turns each section into API request
//! parameters and drives the requests as a resumable state machine that
//! builds a result table.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  YAML/JSON  │────▶│  Validator  │────▶│  Parameter  │────▶│  Operation  │
//! │  document   │     │  (schema)   │     │  generator  │     │  (run loop) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use p123ops::{load_document, ConsoleSink, LogBroadcaster, Operation, P123Client};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let raw = load_document("screen.yaml".as_ref()).await.unwrap();
//!     let client = Arc::new(P123Client::from_env().unwrap());
//!     let logger = Arc::new(LogBroadcaster::new());
//!     let mut op = Operation::init(client, &raw, Box::new(ConsoleSink), logger).await.unwrap();
//!     op.run().await;
//!     println!("{} rows", op.get_result().len());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per concern
//! - [`logs`] - Logger trait and broadcaster
//! - [`schema`] - Validators, transforms, field mappings and the operation catalog
//! - [`document`] - Document loading and validation
//! - [`params`] - Request parameter generation
//! - [`client`] - API client trait and HTTP implementation
//! - [`output`] - Result table and text preview
//! - [`operation`] - Operation state machines

// Core modules
pub mod error;
pub mod logs;

// Declarative schema
pub mod schema;

// Input
pub mod document;
pub mod params;

// API
pub mod client;

// Execution
pub mod operation;
pub mod output;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{ClientError, GenerateError, LoadError, OperationError, ValidationError};

// =============================================================================
// Re-exports - Logging
// =============================================================================

pub use logs::{GlobalLogger, LogBroadcaster, LogCapture, LogEntry, LogLevel, Logger, LOG_BROADCASTER};

// =============================================================================
// Re-exports - Schema
// =============================================================================

pub use schema::{FieldSpec, Mapping, OperationKind, OperationSpec, Rule, Transform, Verdict};

// =============================================================================
// Re-exports - Documents and parameters
// =============================================================================

pub use document::{load_document, parse_document, process_input, Document, Settings};
pub use params::{generate_params, merge_iteration, Params};

// =============================================================================
// Re-exports - Client
// =============================================================================

pub use client::{ApiClient, ClientConfig, P123Client, Request};

// =============================================================================
// Re-exports - Operations and output
// =============================================================================

pub use operation::{Operation, RunControl, RunStatus};
pub use output::{BufferSink, Cell, ConsoleSink, NullSink, OutputSink, ResultTable};
