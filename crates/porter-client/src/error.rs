use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid API host: {host}")]
    InvalidHost {
        host: String,
        #[source]
        source: url::ParseError,
    },
    #[error("API host must be an http(s) URL: {host}")]
    UnsupportedHost { host: String },
    #[error("failed to create HTTP client")]
    HttpClient {
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    AlreadyExists { message: String },
    #[error("Forbidden: {message}")]
    Forbidden { message: String },
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    /// Classify a non-success response by status code, falling back to the
    /// server message for endpoints that report conflicts as generic errors.
    pub(crate) fn from_response(status: u16, message: String) -> Self {
        match status {
            404 => Self::NotFound { message },
            409 => Self::AlreadyExists { message },
            401 | 403 => Self::Forbidden { message },
            _ if message.contains("already exists") => Self::AlreadyExists { message },
            _ if message.contains("not found") => Self::NotFound { message },
            _ => Self::Api { status, message },
        }
    }
}
