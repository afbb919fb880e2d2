use std::fmt;

/// Error types that can occur while configuring a session or talking to the
/// chat provider.
#[derive(Debug)]
pub enum LLMError {
    /// HTTP request/response errors
    HttpError(String),
    /// Authentication and authorization errors
    AuthError(String),
    /// Invalid request parameters or format
    InvalidRequest(String),
    /// Errors returned by the LLM provider
    ProviderError(String),
    /// The provider answered with something that could not be interpreted
    ResponseFormatError {
        message: String,
        raw_response: String,
    },
    /// JSON serialization/deserialization errors
    JsonError(String),
    /// Provider rate limit hit
    TooManyRequests(String),
    /// The credential variable is missing or empty
    AbsentCredential(String),
    /// Invalid local configuration (bad env file, bad override)
    ConfigError(String),
    /// Console read/write failures
    IoError(String),
    /// Anything else
    Generic(String),
}

impl LLMError {
    /// True when the error happened while submitting a turn, as opposed to
    /// configuring the session or using the console.
    pub fn is_request_failure(&self) -> bool {
        !matches!(
            self,
            LLMError::AbsentCredential(_) | LLMError::ConfigError(_) | LLMError::IoError(_)
        )
    }
}

impl fmt::Display for LLMError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LLMError::HttpError(e) => write!(f, "HTTP Error: {e}"),
            LLMError::AuthError(e) => write!(f, "Auth Error: {e}"),
            LLMError::InvalidRequest(e) => write!(f, "Invalid Request: {e}"),
            LLMError::ProviderError(e) => write!(f, "Provider Error: {e}"),
            LLMError::ResponseFormatError {
                message,
                raw_response,
            } => write!(
                f,
                "Response Format Error: {message}. Raw response: {raw_response}"
            ),
            LLMError::JsonError(e) => write!(f, "JSON Parse Error: {e}"),
            LLMError::TooManyRequests(e) => write!(f, "Too Many Requests: {e}"),
            LLMError::AbsentCredential(var) => {
                write!(f, "{var} not found in environment or .env file")
            }
            LLMError::ConfigError(e) => write!(f, "Config Error: {e}"),
            LLMError::IoError(e) => write!(f, "IO Error: {e}"),
            LLMError::Generic(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LLMError {}

/// Converts reqwest HTTP errors into LLMErrors
impl From<reqwest::Error> for LLMError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return LLMError::AuthError(err.to_string());
            }
        }
        LLMError::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for LLMError {
    fn from(err: serde_json::Error) -> Self {
        LLMError::JsonError(err.to_string())
    }
}

impl From<std::io::Error> for LLMError {
    fn from(err: std::io::Error) -> Self {
        LLMError::IoError(err.to_string())
    }
}
