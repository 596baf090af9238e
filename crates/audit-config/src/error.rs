use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("invalid config value: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
