use std::path::PathBuf;

/// Errors that abort a whole batch.
///
/// Per-fixture failures (missing section, compile error, output mismatch) are
/// not errors; they are classified as [`crate::Outcome`] values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to launch {program}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("cannot discover fixtures under {}: {message}", root.display())]
    Discovery { root: PathBuf, message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
