//! Rich diagnostic error types for the advisor.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains. An empty query result is
//! never an error: it is an empty row vector and drives tier advancement.

use miette::Diagnostic;
use thiserror::Error;

use crate::query::Dimension;

/// Top-level error type for the advisor.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum AdvisorError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Vocab(#[from] VocabError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("fact store unavailable: {message}")]
    #[diagnostic(
        code(advisor::store::unavailable),
        help(
            "The fact store could not be reached or timed out. \
             Check that the repository URL is correct and the server is running."
        )
    )]
    Unavailable { message: String },

    #[error("fact store rejected the write (status {status}): {message}")]
    #[diagnostic(
        code(advisor::store::mutation_rejected),
        help(
            "The store declined the update. Inspect the status and message; \
             writes are never retried automatically."
        )
    )]
    MutationRejected { status: u16, message: String },

    #[error("SPARQL query error: {message}")]
    #[diagnostic(
        code(advisor::store::query),
        help("The store failed to evaluate the query. Check the repository contents and query text.")
    )]
    Query { message: String },

    #[error("malformed store response: {message}")]
    #[diagnostic(
        code(advisor::store::malformed),
        help(
            "The store answered with data the advisor could not interpret. \
             This usually means a protocol or version mismatch."
        )
    )]
    Malformed { message: String },
}

// ---------------------------------------------------------------------------
// Resolution errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    #[error("no {dimension} could be resolved for user {user} on dataset {dataset}")]
    #[diagnostic(
        code(advisor::resolve::unresolvable),
        help(
            "Every tier from the most specific to the global one came back empty. \
             Record at least one workflow that carries this dimension first."
        )
    )]
    Unresolvable {
        dimension: Dimension,
        user: String,
        dataset: String,
    },

    #[error("resolving the {dimension} requires an intent")]
    #[diagnostic(
        code(advisor::resolve::missing_intent),
        help("Resolve the intent first and pass it along, e.g. `--intent Classification`.")
    )]
    MissingIntent { dimension: Dimension },
}

// ---------------------------------------------------------------------------
// Vocabulary errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum VocabError {
    #[error("invalid identifier \"{name}\": {message}")]
    #[diagnostic(
        code(advisor::vocab::invalid_identifier),
        help(
            "Identifiers are local names such as `User3` or `iris_dataset`: \
             letters, digits, `_`, `.` and `-`, not starting with `.` or `-`."
        )
    )]
    InvalidIdentifier { name: String, message: String },

    #[error("invalid namespace \"{namespace}\": {message}")]
    #[diagnostic(
        code(advisor::vocab::invalid_namespace),
        help("A namespace must be an absolute IRI ending in `#` or `/`.")
    )]
    InvalidNamespace { namespace: String, message: String },
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("could not allocate a user id after {attempts} attempt(s)")]
    #[diagnostic(
        code(advisor::registry::allocation_conflict),
        help(
            "Other writers kept claiming the candidate ids. Retry the registration, \
             or raise `registrar.max_allocation_attempts`."
        )
    )]
    AllocationConflict { attempts: u32 },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(advisor::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(advisor::config::parse),
        help("Check the TOML syntax. `store.backend` must be \"http\" or \"embedded\".")
    )]
    Parse { path: String, message: String },

    #[error("cannot determine home directory")]
    #[diagnostic(
        code(advisor::config::no_home),
        help("Set HOME or pass an explicit `--config` path.")
    )]
    NoHome,

    #[error("failed to open embedded store at {path}: {message}")]
    #[diagnostic(
        code(advisor::config::embedded_open),
        help("Check that the directory is writable and not locked by another process.")
    )]
    EmbeddedOpen { path: String, message: String },
}

/// Convenience alias for functions returning advisor results.
pub type AdvisorResult<T> = std::result::Result<T, AdvisorError>;
