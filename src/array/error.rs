//! Error types for the array transport and entity repository.

use thiserror::Error;

/// Array error codes that mark a request as busy rather than failed.
///
/// The array answers these with HTTP 400; the same request usually succeeds
/// once the conflicting internal job finishes.
pub const RETRYABLE_ERROR_CODES: [&str; 4] = [
    "MC_ERR_BUSY",
    "MC_ERR_BUSY_SPECIFIC",
    "MC_ERR_INPROGRESS",
    "MC_ERR_START_TIMEOUT",
];

/// Errors raised while talking to the array management API.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ArrayError {
    /// The array reported a busy or in-progress condition.
    #[error("array busy ({code}): {body}")]
    Transient {
        /// Matched entry of [`RETRYABLE_ERROR_CODES`].
        code: &'static str,
        /// Response body returned by the array.
        body: String,
    },
    /// The array rejected the request with a non-success status.
    #[error("array request failed with status {status}: {body}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// Response body returned by the array.
        body: String,
    },
    /// The request never produced an HTTP response.
    #[error("array connection failed: {message}")]
    Connection {
        /// Error message from the HTTP client.
        message: String,
    },
    /// The response body did not match the expected wire format.
    #[error("failed to decode {what} from array response: {message}")]
    Decode {
        /// Description of the value being decoded.
        what: String,
        /// Parser error message.
        message: String,
    },
}

impl ArrayError {
    /// Reclassifies a raw HTTP failure as [`ArrayError::Transient`] when the
    /// array answered 400 with one of the busy codes.
    #[must_use]
    pub fn classify(self) -> Self {
        match self {
            Self::Request { status: 400, body } => {
                match RETRYABLE_ERROR_CODES
                    .iter()
                    .copied()
                    .find(|code| body.contains(code))
                {
                    Some(code) => Self::Transient { code, body },
                    None => Self::Request { status: 400, body },
                }
            }
            other => other,
        }
    }

    /// Returns true when the error is a recognised busy condition.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Converts an exhausted transient error into a plain request error.
    #[must_use]
    pub fn into_exhausted(self) -> Self {
        match self {
            Self::Transient { body, .. } => Self::Request { status: 400, body },
            other => other,
        }
    }

    pub(crate) fn decode(what: impl Into<String>, err: &serde_json::Error) -> Self {
        Self::Decode {
            what: what.into(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("MC_ERR_BUSY", "MC_ERR_BUSY")]
    #[case("{\"error_code\": \"MC_ERR_INPROGRESS\"}", "MC_ERR_INPROGRESS")]
    #[case("MC_ERR_START_TIMEOUT while creating", "MC_ERR_START_TIMEOUT")]
    fn classify_marks_busy_codes_transient(#[case] body: &str, #[case] expected: &str) {
        let err = ArrayError::Request {
            status: 400,
            body: body.to_owned(),
        }
        .classify();
        assert!(
            matches!(err, ArrayError::Transient { code, .. } if code == expected),
            "unexpected classification: {err:?}"
        );
    }

    #[test]
    fn classify_leaves_other_statuses_alone() {
        let err = ArrayError::Request {
            status: 409,
            body: String::from("MC_ERR_BUSY"),
        }
        .classify();
        assert!(!err.is_transient());
    }

    #[test]
    fn classify_leaves_unknown_400_codes_alone() {
        let err = ArrayError::Request {
            status: 400,
            body: String::from("MC_ERR_NAME_EXISTS"),
        }
        .classify();
        assert_eq!(
            err,
            ArrayError::Request {
                status: 400,
                body: String::from("MC_ERR_NAME_EXISTS"),
            }
        );
    }

    #[test]
    fn exhausted_transient_becomes_request_error() {
        let err = ArrayError::Transient {
            code: "MC_ERR_BUSY",
            body: String::from("MC_ERR_BUSY"),
        }
        .into_exhausted();
        assert_eq!(
            err,
            ArrayError::Request {
                status: 400,
                body: String::from("MC_ERR_BUSY"),
            }
        );
    }
}
