use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// The variable is set but blank.
    #[error("Environment variable is empty: {0}")]
    EmptyEnvVar(String),
}
