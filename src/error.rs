use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("invalid target identifier: {0:?}")]
    InvalidTarget(String),

    #[error("whole-program mode needs at least one test case")]
    MissingCase,

    #[error("could not serialize test cases: {0}")]
    Serialize(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("could not find results block")]
    MissingResultsBlock,

    #[error("malformed results payload: {0}")]
    Malformed(String),

    #[error("unexpected results shape: {0}")]
    UnexpectedShape(&'static str),

    #[error("expected {expected} results, probe reported {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("sandbox unavailable: {0}")]
    Unavailable(String),

    #[error("sandbox transport error: {0}")]
    Transport(String),

    #[error("sandbox did not answer within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("progress storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("progress record is corrupt: {0}")]
    Corrupt(String),

    #[error("progress storage unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Corrupt(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum LessonError {
    #[error("could not read lesson file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid lesson YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("section {section:?}: {reason}")]
    Invalid { section: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("section {section:?} is not a {expected} exercise")]
    WrongSection {
        section: String,
        expected: &'static str,
    },

    #[error("no row has arguments to run")]
    NothingToRun,

    #[error(transparent)]
    Generation(#[from] GenerationError),
}
