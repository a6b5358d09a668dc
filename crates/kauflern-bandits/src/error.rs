use thiserror::Error;

#[derive(Debug, Error)]
pub enum BanditError {
    #[error("Snapshot deserialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("No candidate offers to choose from")]
    EmptyCatalog,
    #[error("Reward must be a finite number, got {0}")]
    NonFiniteReward(f64),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, BanditError>;
