use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// Why a roster or reference-image download failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// DNS, connect, TLS or timeout: the server could not be reached.
    Connectivity,
    /// The origin refused access or redirected to a different origin.
    CrossOrigin,
    /// Any other non-success status.
    Status,
    /// The body was not what we expected.
    Decode,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureClass::Connectivity => "connectivity",
            FailureClass::CrossOrigin => "cross-origin",
            FailureClass::Status => "http status",
            FailureClass::Decode => "decode",
        })
    }
}

fn status_suffix(status: &Option<StatusCode>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not reach {url}: {source}")]
    Connectivity {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} refused cross-origin access{}", status_suffix(.status))]
    CrossOrigin {
        url: String,
        status: Option<StatusCode>,
    },

    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl FetchError {
    pub fn class(&self) -> FailureClass {
        match self {
            FetchError::Connectivity { .. } => FailureClass::Connectivity,
            FetchError::CrossOrigin { .. } => FailureClass::CrossOrigin,
            FetchError::Status { .. } => FailureClass::Status,
            FetchError::Decode { .. } => FailureClass::Decode,
        }
    }

    /// Map a transport error to its failure class.
    pub fn from_transport(url: &str, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() || err.is_connect() {
            FetchError::Connectivity { url, source: err }
        } else if err.is_redirect() {
            FetchError::CrossOrigin { url, status: None }
        } else if err.is_decode() || err.is_body() {
            FetchError::Decode {
                url,
                reason: err.to_string(),
            }
        } else {
            FetchError::Connectivity { url, source: err }
        }
    }

    /// Map a non-success status to its failure class.
    pub fn from_status(url: &str, status: StatusCode) -> Self {
        let url = url.to_string();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::CrossOrigin {
                url,
                status: Some(status),
            },
            _ => FetchError::Status { url, status },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        let forbidden = FetchError::from_status("http://x/a.jpg", StatusCode::FORBIDDEN);
        assert_eq!(forbidden.class(), FailureClass::CrossOrigin);
        assert_eq!(
            forbidden.to_string(),
            "http://x/a.jpg refused cross-origin access (403 Forbidden)"
        );

        let missing = FetchError::from_status("http://x/a.jpg", StatusCode::NOT_FOUND);
        assert_eq!(missing.class(), FailureClass::Status);
    }
}
