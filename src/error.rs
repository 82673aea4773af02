//! Error types for `strandyard`.

use std::path::PathBuf;

/// Errors that can occur while loading, mutating, or persisting tasks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON parsing error occurred.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML error occurred outside of front matter decoding.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A task file does not start with a closed front matter block.
    #[error("invalid task file format: missing frontmatter delimiters in {}", path.display())]
    InvalidFrontmatter {
        /// The offending file, empty when parsing from a string.
        path: PathBuf,
    },

    /// The front matter block could not be decoded.
    #[error("{}:{line}: failed to parse frontmatter: {message}", path.display())]
    FrontmatterParse {
        /// The offending file, empty when parsing from a string.
        path: PathBuf,
        /// 1-based line in the task file, 0 when unknown.
        line: usize,
        /// The decoder's message.
        message: String,
    },

    /// A task file could not be loaded.
    #[error("failed to parse task {}: {source}", path.display())]
    TaskFile {
        /// The file that failed.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Two task files map to the same ID.
    #[error("duplicate task ID {id}: {} and {}", first.display(), second.display())]
    DuplicateTaskId {
        /// The repeated ID.
        id: String,
        /// The file seen first.
        first: PathBuf,
        /// The file seen second.
        second: PathBuf,
    },

    /// A task-related error occurred.
    #[error("{0}")]
    Task(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap a task-level error.
    pub fn task<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Task(Box::new(err))
    }

    /// Downcast a task-level error to a concrete type.
    #[must_use]
    pub fn task_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Task(inner) => inner.downcast_ref::<E>(),
            Self::TaskFile { source, .. } => source.task_error::<E>(),
            _ => None,
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
