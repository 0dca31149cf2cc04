use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Required command not found: {0}")]
    DependencyMissing(String),

    #[error("Dump stage failed: {0}")]
    DumpFailed(String),

    #[error("Restore stage failed: {0}")]
    RestoreFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    /// Process exit code for this failure class. Wrapper scripts tell the
    /// stages apart by code alone, so these stay stable.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) => 2,
            AppError::DependencyMissing(_) => 3,
            AppError::DumpFailed(_) => 4,
            AppError::RestoreFailed(_) => 5,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
