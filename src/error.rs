use thiserror::Error;

/// What went wrong while picking apart a server response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The body was not valid JSON.
    #[error("parsing JSON failed: {0}")]
    Parse(String),
    /// The key path was not present in the document.
    #[error("retrieval of '{0}' failed")]
    MissingKey(String),
    /// The key path was present but held the wrong JSON type.
    #[error("returned '{key}' is not {expected}")]
    WrongType { key: String, expected: &'static str },
    /// The value was well-typed but outside its allowed range.
    #[error("returned '{key}' {reason}")]
    OutOfRange { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum RestError {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("path error: {0}")]
    Path(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("request error: {0}")]
    Request(String),

    #[error("HTTP {status} - {message}")]
    Http { status: u16, message: &'static str },

    #[error("bad server response: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("no write intent on domain '{0}'")]
    PermissionDenied(String),

    #[error("Operation is not supported: {0}")]
    Unsupported(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RestError>;

impl RestError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RestError::NotFound(_) | RestError::Http { status: 404, .. }
        )
    }
}

impl From<std::io::Error> for RestError {
    fn from(err: std::io::Error) -> Self {
        RestError::Request(format!("I/O error: {err}"))
    }
}

impl From<reqwest::Error> for RestError {
    fn from(err: reqwest::Error) -> Self {
        RestError::Request(err.to_string())
    }
}

impl From<url::ParseError> for RestError {
    fn from(err: url::ParseError) -> Self {
        RestError::Argument(format!("invalid URL: {err}"))
    }
}

impl From<serde_json::Error> for RestError {
    fn from(err: serde_json::Error) -> Self {
        RestError::Protocol(ProtocolError::Parse(err.to_string()))
    }
}

impl From<base64::DecodeError> for RestError {
    fn from(err: base64::DecodeError) -> Self {
        RestError::Encoding(format!("base64 decode failed: {err}"))
    }
}

// Property lists travel as bincode blobs, so their failures are encoding errors too.
impl From<bincode::Error> for RestError {
    fn from(err: bincode::Error) -> Self {
        RestError::Encoding(format!("property list codec failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_root() -> Result<()> {
        let parsed: std::result::Result<(), ProtocolError> =
            Err(ProtocolError::MissingKey("root".to_string()));
        parsed?;
        Ok(())
    }

    #[test]
    fn protocol_errors_convert_and_display() {
        let err = missing_root().unwrap_err();
        assert!(matches!(&err, RestError::Protocol(ProtocolError::MissingKey(k)) if k == "root"));
        assert_eq!(err.to_string(), "bad server response: retrieval of 'root' failed");

        let wrong = ProtocolError::WrongType {
            key: "shape.dims".to_string(),
            expected: "an array",
        };
        assert_eq!(wrong.to_string(), "returned 'shape.dims' is not an array");
        let range = ProtocolError::OutOfRange {
            key: "rank".to_string(),
            reason: "exceeds 32".to_string(),
        };
        assert_eq!(range.to_string(), "returned 'rank' exceeds 32");
    }
}
