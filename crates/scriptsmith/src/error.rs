use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptsmithError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Graph error: {0}")]
    Graph(#[from] crate::graph::GraphError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Task error: {0}")]
    Task(#[from] crate::task::TaskError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Input rejected before any generation work starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Requirement is required")]
    EmptyRequirement,

    #[error("Requirement must be between {min} and {max} characters (got {len})")]
    RequirementLength { len: usize, min: usize, max: usize },

    #[error("Requirement contains invalid characters")]
    RequirementCharacters,

    #[error("Unknown browser '{0}' (expected chromium, firefox or webkit)")]
    UnknownBrowser(String),

    #[error("Unknown predefined requirement '{0}'")]
    UnknownPredefined(String),

    #[error("Invalid file type '{0}'. Only .zip files are allowed")]
    DisallowedArchiveType(String),

    #[error("Archive is not a valid zip file: {0}")]
    MalformedArchive(String),

    #[error("Archive contains no files")]
    EmptyArchive,

    #[error("Archive entry '{0}' escapes the extraction root")]
    PathTraversal(String),

    #[error("Archive exceeds limit: {0}")]
    ArchiveTooLarge(String),

    #[error("Unknown role '{0}' (expected developer, qa or admin)")]
    UnknownRole(String),

    #[error("Username '{0}' is already taken")]
    DuplicateUsername(String),

    #[error("Username must be between {min} and {max} characters (got {len})")]
    UsernameLength { len: usize, min: usize, max: usize },

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Search query must be at most {max} characters")]
    QueryTooLong { max: usize },

    #[error("Cannot delete your own account")]
    CannotDeleteSelf,
}

/// Failure of an external generation or browser capability.
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("Text generation failed: {0}")]
    Generation(String),

    #[error("Text generation returned an empty response")]
    EmptyResponse,

    #[error("Could not parse generated output: {0}")]
    MalformedResponse(String),

    #[error("Script execution failed to start: {0}")]
    Launch(String),

    #[error("Script execution timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Browser session failed: {0}")]
    Session(String),

    #[error("I/O error in '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Job failed: {0}")]
    JobFailed(String),
}

pub type Result<T> = std::result::Result<T, ScriptsmithError>;
