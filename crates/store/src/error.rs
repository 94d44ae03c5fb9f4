//! Error types for the fingerprint store

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for fingerprint store operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error while managing the store directory
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(fpstore::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "remove_dir_all")
        operation: String,
    },

    /// The storage engine rejected an operation
    #[error("Storage engine error during {operation}: {message}")]
    #[diagnostic(
        code(fpstore::engine),
        help("The store may be corrupt or locked by another process; deleting the store directory forces a rebuild")
    )]
    Engine {
        /// Operation that failed (e.g., "open", "iterate", "checkpoint")
        operation: String,
        /// Engine error message
        message: String,
    },

    /// A read-only open found no store
    #[error("No fingerprint store at {}", path.display())]
    #[diagnostic(
        code(fpstore::not_found),
        help("Read-only sessions never create a store; open read-write once to initialize it")
    )]
    StoreNotFound {
        /// Directory that was expected to hold a store
        path: Box<Path>,
    },

    /// An expected column family is not present in the open store
    #[error("Column family not found: {column}")]
    #[diagnostic(code(fpstore::missing_column))]
    MissingColumn {
        /// Name of the missing column
        column: String,
    },

    /// A binary or JSON record could not be encoded or decoded
    #[error("Codec error: {message}")]
    #[diagnostic(code(fpstore::codec))]
    Codec {
        /// Error message describing the encoding issue
        message: String,
    },

    /// Configuration or validation error
    #[error("Fingerprint store configuration error: {message}")]
    #[diagnostic(code(fpstore::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create an engine error
    #[must_use]
    pub fn engine(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Engine {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    /// Create a store-not-found error
    #[must_use]
    pub fn store_not_found(path: impl AsRef<Path>) -> Self {
        Self::StoreNotFound {
            path: path.as_ref().into(),
        }
    }

    /// Create a missing column error
    #[must_use]
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    /// Create a codec error
    #[must_use]
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec {
            message: msg.into(),
        }
    }
}

/// Result type for fingerprint store operations
pub type Result<T> = std::result::Result<T, Error>;
