use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported file type: {}", .0.display())]
    UnsupportedLanguage(PathBuf),
    #[error("failed to load grammar: {0}")]
    Grammar(String),
    #[error("{} could not be parsed", .0.display())]
    Unparsable(PathBuf),
    #[error("instrumented {} is not valid source: {diagnostic}", .path.display())]
    RewriteInvalid { path: PathBuf, diagnostic: String },
    #[error("mutation id {id} is used twice in {}", .path.display())]
    DuplicateMutationId { id: String, path: PathBuf },
    #[error("no mutations discovered")]
    NoMutationsDiscovered,
    #[error("invalid configuration in {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
