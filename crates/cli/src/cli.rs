use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand, ValueEnum};
use fpstore::Column;
use miette::{Diagnostic, Report};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Success exit code
pub const EXIT_OK: i32 = 0;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Store error exit code
pub const EXIT_STORE: i32 = 3;

/// CLI-specific error types with exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(fpstore::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// The store could not be opened, read or maintained (exit code 3)
    #[error("Store error: {message}")]
    #[diagnostic(code(fpstore::cli::store))]
    Store {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Nothing found for the requested key (exit code 3)
    #[error("Not found: {message}")]
    #[diagnostic(code(fpstore::cli::not_found))]
    NotFound {
        /// What was looked up
        message: String,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new store error
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new store error with help text
    #[must_use]
    pub fn store_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a not-found error
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }
}

/// Convert `fpstore::Error` to the matching `CliError` variant.
///
/// - Configuration errors -> Config (exit code 2)
/// - Everything the store itself raised -> Store (exit code 3)
impl From<fpstore::Error> for CliError {
    fn from(err: fpstore::Error) -> Self {
        let help = err.help().map(|h| h.to_string());
        match err {
            fpstore::Error::Configuration { message } => Self::Config {
                message,
                help: None,
            },
            other => Self::Store {
                message: other.to_string(),
                help,
            },
        }
    }
}

/// Map CLI error to exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Store { .. } | CliError::NotFound { .. } => EXIT_STORE,
    }
}

/// Render error to stderr, as a JSON envelope on stdout in JSON mode
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let envelope = ErrorEnvelope::new(serde_json::json!({
            "code": match err {
                CliError::Config { .. } => "config",
                CliError::Store { .. } => "store",
                CliError::NotFound { .. } => "not_found",
            },
            "message": err.to_string()
        }));

        match serde_json::to_string(&envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Column names accepted on the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColumnArg {
    /// Fingerprint keys by semi-stable id
    Default,
    /// Weak fingerprint inputs by semi-stable id
    Weak,
    /// Strong fingerprint inputs by semi-stable id
    Strong,
    /// Content-addressed inputs
    ContentHashes,
    /// Output hash aliases
    Aliases,
}

impl From<ColumnArg> for Column {
    fn from(arg: ColumnArg) -> Self {
        match arg {
            ColumnArg::Default => Self::Default,
            ColumnArg::Weak => Self::WeakFingerprints,
            ColumnArg::Strong => Self::StrongFingerprints,
            ColumnArg::ContentHashes => Self::ContentHashes,
            ColumnArg::Aliases => Self::OutputIdentifierAlias,
        }
    }
}

/// Inspect and maintain fingerprint stores.
#[derive(Parser, Debug)]
#[command(name = "fpstore")]
#[command(about = "Inspect and maintain garbage-collected fingerprint stores")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    /// Log output format.
    #[arg(long, global = true, default_value = "compact", value_enum)]
    pub log_format: TracingFormat,

    /// Emit command results as JSON envelopes.
    #[arg(long, global = true)]
    pub json: bool,

    /// TOML file with store settings.
    #[arg(short = 'c', long, global = true, env = "FPSTORE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the joined entry for a semi-stable id
    Entry {
        /// Store directory
        store: PathBuf,
        /// Semi-stable id of the task
        semi_stable_id: String,
        /// Stable output hash to resolve first
        #[arg(long)]
        output_hash: Option<String>,
    },
    /// Show the inputs stored under a content hash
    ContentHash {
        /// Store directory
        store: PathBuf,
        /// Content hash
        hash: String,
    },
    /// Show the cache-miss list of the last build
    CacheMisses {
        /// Store directory
        store: PathBuf,
    },
    /// List the keys of one column
    Keys {
        /// Store directory
        store: PathBuf,
        /// Column to list
        #[arg(long, value_enum, default_value = "default")]
        column: ColumnArg,
    },
    /// Show estimated key counts per column
    Stats {
        /// Store directory
        store: PathBuf,
    },
    /// Remove the fingerprint rows of a semi-stable id
    Remove {
        /// Store directory
        store: PathBuf,
        /// Semi-stable id of the task
        semi_stable_id: String,
    },
    /// Open read-write and run garbage collection
    Gc {
        /// Store directory
        store: PathBuf,
        /// Override the max entry age, in seconds
        #[arg(long)]
        max_entry_age_secs: Option<u64>,
        /// Override the garbage collection budget, in milliseconds
        #[arg(long)]
        gc_budget_ms: Option<u64>,
    },
    /// Copy a closed store into a log directory
    Copy {
        /// Store directory
        store: PathBuf,
        /// Destination directory, replaced if present; must not overlap the store
        destination: PathBuf,
    },
    /// Take a consistent checkpoint; the store is opened read-write and
    /// collected at close
    Checkpoint {
        /// Store directory
        store: PathBuf,
        /// Destination directory, must not exist
        destination: PathBuf,
    },
}

/// Parse the process arguments.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
