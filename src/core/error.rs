use std::path::PathBuf;
use thiserror::Error;

/// Result type for the script building core.
pub type BuildResult<T> = Result<T, BuildError>;

/// Fatal conditions that abort a build before any script is emitted.
///
/// Everything the extractor merely disagrees with is reported as a
/// [`Diagnostic`](crate::builders::reporter::Diagnostic) instead.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The input file could not be opened or read.
    #[error("Could not read input file {path}: {source}")]
    InputFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file that should be staged does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// A required executable was neither given nor found.
    #[error("Missing executable: {0}")]
    MissingExecutable(String),

    /// The executable selector program failed.
    #[error("Could not determine executable: {0}")]
    ExecutableNotDetermined(String),

    /// `render` was called without any hook that runs the payload.
    #[error("No payload hook registered, refusing to render an empty job script")]
    NoPayloadHook,

    /// A commandline or directive argument is inconsistent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BuildError::FileNotFound(PathBuf::from("geom.xyz"));
        assert_eq!(err.to_string(), "File not found: geom.xyz");

        let err = BuildError::NoPayloadHook;
        assert!(err.to_string().contains("No payload hook"));

        let err = BuildError::InputFileUnreadable {
            path: PathBuf::from("job.inp"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.to_string(), "Could not read input file job.inp: gone");
    }
}
