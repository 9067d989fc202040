/// Error types for the assembly pipeline
/// Data-level problems are counted and reported in the run summary,
/// structural problems abort the run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssemblyError {
    /// Invalid options, paths, or modes. Raised before any heavy work starts.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Unreadable or invalid read data that cannot be handled by discarding
    /// individual reads (e.g. no reads remain after validation).
    #[error("invalid input: {0}")]
    Input(String),

    /// Memory allocation or backing storage failure.
    #[error("resource failure: {0}. Check available memory and free disk space in the assembly directory")]
    Resource(String),

    /// Internal assertion, only expected to fire on bugs.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Interactive subgraph extraction did not finish in time.
    #[error("not computed within timeout")]
    Timeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AssemblyError {
    /// Map an error to the process exit code.
    /// 0 success, 1 invalid options, 2 runtime error or out-of-memory,
    /// 3 other standard failure, 4 unknown.
    pub fn exit_code(&self) -> i32 {
        match self {
            AssemblyError::Configuration(_) => 1,
            AssemblyError::Resource(_) | AssemblyError::Io(_) => 2,
            AssemblyError::Input(_) | AssemblyError::Timeout => 3,
            AssemblyError::InvariantViolation(_) => 3,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        AssemblyError::Configuration(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        AssemblyError::InvariantViolation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
