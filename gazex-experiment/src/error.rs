use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExperimentError>;

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("required collaborator missing: {0}")]
    MissingCollaborator(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to read or write run state: {0}")]
    RunState(#[from] serde_json::Error),
}
