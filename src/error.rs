use thiserror::Error;

// Every variant aborts the current run. None of them is retried: the same
// inputs would reproduce the same failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    #[error("definition error: {0}")]
    Definition(String),
    #[error("unknown intervention target `{0}`")]
    UnknownTarget(String),
    #[error("consistency error: {0}")]
    Consistency(String),
    #[error("invalid time grid: {0}")]
    InvalidGrid(String),
    #[error("numerical instability at t={t}: {reason}")]
    NumericalInstability { t: f64, reason: String },
    #[error("negative copy number {value} for species `{species}` at t={t}")]
    NegativeState { species: String, t: f64, value: i64 },
}

pub type Result<T> = std::result::Result<T, SimError>;
