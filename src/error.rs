// Error type shared by the library modules.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The server answered with a non-success status.
    #[error("{action} failed: code {code}: {description}")]
    Api {
        action: String,
        code: String,
        description: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    #[error("signature of {sender} does not match the file contents")]
    InvalidSignature { sender: String },

    #[error("unsupported key: {0}")]
    UnsupportedKey(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

impl Error {
    /// Create an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
