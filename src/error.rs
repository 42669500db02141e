use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("Report not found: {path:?}: {source}")]
    ReportNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed report {path:?}: {reason}")]
    MalformedReport { path: PathBuf, reason: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Secret error: {0}")]
    Secret(String),

    #[error("Environment error: {0}")]
    Environment(String),
}

impl StatusError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StatusError::MalformedReport {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<rusqlite::Error> for StatusError {
    fn from(err: rusqlite::Error) -> Self {
        StatusError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for StatusError {
    fn from(err: serde_json::Error) -> Self {
        StatusError::Persistence(format!("history encoding: {}", err))
    }
}
