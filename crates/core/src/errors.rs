use std::path::PathBuf;

/// Result type alias for bcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for bcache operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A response file could not be read or expanded
    #[error("bad response file '{path}': {message}")]
    BadResponseFile { path: PathBuf, message: String },

    /// An input file needed for hashing could not be read
    #[error("cannot read input file '{path}': {source}")]
    MissingInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The preprocessing step failed
    #[error("preprocessing failed: {message}")]
    PreprocessFailed { message: String },

    /// A subprocess could not be launched
    #[error("failed to execute '{command}': {message}")]
    ToolExec { command: String, message: String },

    /// Cache storage read/write errors
    #[error("cache storage error: {message}")]
    Storage { message: String },

    /// The command cannot be cached by this wrapper
    #[error("unsupported command: {message}")]
    Unsupported { message: String },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Config { message: String },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    /// Create a response file error
    #[must_use]
    pub fn bad_response_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::BadResponseFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a missing input error
    #[must_use]
    pub fn missing_input(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::MissingInput {
            path: path.into(),
            source,
        }
    }

    /// Create a preprocessing error
    #[must_use]
    pub fn preprocess(message: impl Into<String>) -> Self {
        Error::PreprocessFailed {
            message: message.into(),
        }
    }

    /// Create a tool execution error
    #[must_use]
    pub fn tool_exec(command: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolExec {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a cache storage error
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }

    /// Create an unsupported command error
    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }
}
