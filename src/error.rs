use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Missing input file: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("Table '{table}' is missing required columns: {}", columns.join(", "))]
    Schema { table: String, columns: Vec<String> },

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Quality checks failed ({} errors). See {}", errors.len(), report_path.display())]
    QualityGateFailure {
        report_path: PathBuf,
        errors: Vec<String>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Chart rendering failed: {0}")]
    Chart(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::MissingInput { .. } => 2,
            PipelineError::Schema { .. } => 3,
            PipelineError::EmptyResult(_) => 4,
            PipelineError::QualityGateFailure { .. } => 5,
            _ => 1,
        }
    }
}
