//! Error taxonomy. Every variant is fatal for a run; nothing is retried.

use thiserror::Error;

use crate::scheme::CategoryCode;

/// Failures resolving a network identifier to a category.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// No metadata row's `name` matches the lookup key.
    #[error("no metadata row matches network '{identifier}' (lookup key '{key}')")]
    NotFound { identifier: String, key: String },

    /// The row resolved, but its author (or habitat) is absent from the category scheme.
    #[error("network '{identifier}': {field} '{value}' is not mapped by category scheme '{scheme}'")]
    UnmappedCategory {
        identifier: String,
        field: &'static str,
        value: String,
        scheme: String,
    },
}

/// Problems with a category scheme definition or lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemeError {
    #[error("Failed to parse category scheme: {0}")]
    Parse(String),

    #[error("Invalid category scheme '{scheme}': {message}")]
    Invalid { scheme: String, message: String },

    #[error("Unknown built-in scheme '{name}'. Available: {available}")]
    UnknownBuiltin { name: String, available: String },

    /// A code with no visual encoding. The classifier and encoding table are out of sync.
    #[error("category code {code} has no visual encoding (scheme defines {len} categories)")]
    UnknownCategory { code: CategoryCode, len: usize },
}

/// Structural problems in the input tables, detected at load time.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to read {what}: {source}")]
    Io {
        what: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in {what}: {source}")]
    Csv {
        what: String,
        #[source]
        source: csv::Error,
    },

    #[error("{what} is missing required column '{column}'")]
    MissingColumn { what: String, column: String },

    #[error("{what} has more than one '{column}' column (header spellings: {spellings})")]
    AmbiguousColumn {
        what: String,
        column: String,
        spellings: String,
    },

    #[error("Invalid dissimilarity matrix: {0}")]
    Matrix(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MdsError {
    #[error("MDS input contains a non-finite value at ({row}, {col})")]
    NonFinite { row: usize, col: usize },

    #[error("MDS requires a square matrix, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("MDS failed: {0}")]
    Numerical(String),
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Output file has no extension")]
    MissingExtension,

    #[error("Unsupported output format: .{0} (use {1})")]
    UnsupportedFormat(String, &'static str),

    #[error("Invalid --png-scale value: {0}")]
    InvalidScale(f32),

    #[error("{0}")]
    Render(String),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode coordinates: {0}")]
    Encode(String),
}

/// Top-level error for a full pipeline run.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Scheme(#[from] SchemeError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Mds(#[from] MdsError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
