//! Error types shared by the template compiler, the ingestion pipeline and the
//! lazy initializer.

use thiserror::Error;

/// Failure to resolve a path against a document tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path not found: {path}")]
    NotFound { path: String },
    #[error("node at {path} cannot hold children")]
    NotAContainer { path: String },
}

/// Errors raised while loading or compiling a metric template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("template schema error: {0}")]
    Schema(String),
    #[error("invalid value spec at {path}: {reason}")]
    InvalidSpec { path: String, reason: String },
    #[error("failed to read template file: {0}")]
    Io(#[from] std::io::Error),
    #[error("template path error: {0}")]
    Path(#[from] PathError),
}

/// Unparsable duration option; recovered by falling back to the default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration '{value}': {reason}")]
pub struct ConfigParseError {
    pub value: String,
    pub reason: String,
}

/// One-time setup failure. Fatal for the hosting process.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("couldn't load metric template: {0}")]
    Template(#[from] TemplateError),
    #[error("couldn't start exposure server on port {port}: {source}")]
    Server {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("publisher has not been started")]
    NotStarted,
}

/// Codec failures for an incoming batch.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown content type '{0}'")]
    UnsupportedContentType(String),
    #[error("error decoding batch: {0}")]
    Decode(#[from] bincode::Error),
}

/// Everything `Publisher::publish` can return.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publisher setup failed: {0}")]
    Setup(#[from] SetupError),
    #[error("unknown content type '{0}'")]
    UnsupportedContentType(String),
    #[error("error decoding batch: {0}")]
    Decode(bincode::Error),
    #[error("internal document error: {0}")]
    Path(#[from] PathError),
}

impl From<CodecError> for PublishError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedContentType(tag) => PublishError::UnsupportedContentType(tag),
            CodecError::Decode(e) => PublishError::Decode(e),
        }
    }
}

impl PublishError {
    /// Setup failures leave no usable template; the host must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PublishError::Setup(_))
    }
}
