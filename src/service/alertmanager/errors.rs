use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, Error, Eq, PartialEq, Serialize)]
#[serde(tag = "error", content = "details", rename_all = "snake_case")]
pub enum AlertmanagerError {
    /// Connection, DNS, timeout or non-200 responses.
    #[error("HTTP request error: {0}")]
    Transport(String),

    #[error("Deserialization error: {0}")]
    Decode(String),

    /// The Alertmanager answered with a status other than "success".
    #[error("Alertmanager error: {0}")]
    Upstream(String),

    #[error("Unsupported Alertmanager version: {0}")]
    UnsupportedVersion(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Collection cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for AlertmanagerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl From<serde_json::Error> for AlertmanagerError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

impl From<url::ParseError> for AlertmanagerError {
    fn from(error: url::ParseError) -> Self {
        Self::Config(format!("Invalid URI: {error}"))
    }
}

impl From<semver::Error> for AlertmanagerError {
    fn from(error: semver::Error) -> Self {
        Self::UnsupportedVersion(error.to_string())
    }
}
