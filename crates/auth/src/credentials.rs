//! API key and secret handling.

use crate::error::AuthError;
use secrecy::{ExposeSecret, SecretString};

const API_KEY_VAR: &str = "PROBIT_API_KEY";
const API_SECRET_VAR: &str = "PROBIT_API_SECRET";

/// API key (client id) and secret used to obtain access tokens.
#[derive(Clone)]
pub struct ApiCredentials {
    api_key: String,
    secret_key: SecretString,
}

impl ApiCredentials {
    /// Load credentials from `PROBIT_API_KEY` and `PROBIT_API_SECRET`.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    ///
    /// # Errors
    /// `MissingEnvVar` if a variable is unset, `EmptyEnvVar` if it is blank.
    pub fn from_env() -> Result<Self, AuthError> {
        dotenvy::dotenv().ok();

        let api_key = required_var(API_KEY_VAR)?;
        let secret_key = required_var(API_SECRET_VAR)?;

        Ok(Self::new(api_key, secret_key))
    }

    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key: SecretString::from(secret_key),
        }
    }

    /// The public key, safe to log.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The secret, for building the token request only. Never log it.
    pub fn expose_secret(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

fn required_var(name: &str) -> Result<String, AuthError> {
    let value = std::env::var(name).map_err(|_| AuthError::MissingEnvVar(name.into()))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::EmptyEnvVar(name.into()));
    }
    Ok(value.to_string())
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}
