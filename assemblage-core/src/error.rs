//! Error types for configuration, fetching, and assembly.

use thiserror::Error;

/// HTTP 417 Expectation Failed, reported for the two content failures.
pub const EXPECTATION_FAILED: u16 = 417;

/// HTTP 502 Bad Gateway, reported when the pipeline could not be reached.
pub const BAD_GATEWAY: u16 = 502;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid pattern in {field}: {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Why a fetch produced no usable content
///
/// Every variant renders to a `(status, text)` pair through [`status`] and
/// [`text`], which the error slots of an assemblage substitute into the
/// failed block.
///
/// [`status`]: FetchError::status
/// [`text`]: FetchError::text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Fetch failed with {status}: {}", .text.as_deref().unwrap_or(""))]
    Failed { status: u16, text: Option<String> },

    #[error("Unknown encoding: {0}")]
    UnknownEncoding(String),

    #[error("Response too large: exceeds {maximum} bytes")]
    ResponseTooLarge { maximum: usize },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to read content: {0}")]
    Io(String),
}

impl FetchError {
    pub fn status(&self) -> u16 {
        match self {
            FetchError::Failed { status, .. } => *status,
            FetchError::UnknownEncoding(_) | FetchError::ResponseTooLarge { .. } => {
                EXPECTATION_FAILED
            }
            FetchError::Transport(_) | FetchError::Io(_) => BAD_GATEWAY,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            FetchError::Failed { text, .. } => text.as_deref().unwrap_or(""),
            FetchError::UnknownEncoding(_) => "Unknown encoding",
            FetchError::ResponseTooLarge { .. } => "Response too large",
            FetchError::Transport(_) | FetchError::Io(_) => "Bad Gateway",
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err.to_string())
    }
}

/// Conditions under which a scope is left unassembled
///
/// None of these fail the outer request; they are reported through the
/// log and the affected content passes through unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblageError {
    #[error("No URI reference located in block")]
    UnresolvableReference,

    #[error("No matchers for URI {0}")]
    NoMatchersForUri(String),

    #[error("No assemblage for content type {0}")]
    NoMatchersForContentType(String),

    #[error("Assembled content has characters {0} cannot represent")]
    Unencodable(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
