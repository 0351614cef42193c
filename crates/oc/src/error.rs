#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported message format: {0}")]
    UnsupportedMessageFormat(serde_json::Value),
    #[error("the user message is empty")]
    EmptyMessage,
    #[error("transport error: {0}")]
    Transport(#[from] ollama_stream::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
