use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Connection not found: {0}")]
    NotFound(String),

    #[error("Failed to open connection '{id}': {error:#}")]
    Connection { id: String, error: anyhow::Error },

    #[error("Management API returned {status}: {body}")]
    UpstreamApi { status: u16, body: String },

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Errors while closing connections: {}", join_close_errors(.0))]
    Close(Vec<CloseError>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct CloseError {
    pub connection_id: String,
    pub error: anyhow::Error,
}

fn join_close_errors(errors: &[CloseError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {:#}", e.connection_id, e.error))
        .collect::<Vec<_>>()
        .join("; ")
}
