//! Error types for options loading and resolution

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read options file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse options: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("environment variable '{0}' is referenced but not set")]
    MissingEnvVar(String),

    #[error("invalid substitution pattern: {0}")]
    Pattern(String),

    #[error("invalid options: {0}")]
    Invalid(String),
}
