//! Error type shared by handlers and middleware.

use hyper::StatusCode;

/// Errors produced while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The request could not be built or understood.
	#[error("Invalid request: {0}")]
	InvalidRequest(String),

	/// A handler or middleware failed for a reason the client cannot fix.
	#[error("Internal server error: {0}")]
	Internal(String),

	/// A JSON body could not be produced or read.
	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl Error {
	/// Returns the HTTP status this error maps to.
	///
	/// # Examples
	///
	/// ```
	/// use edges_http::Error;
	/// use hyper::StatusCode;
	///
	/// let err = Error::InvalidRequest("missing uri".into());
	/// assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
	/// ```
	pub fn status_code(&self) -> StatusCode {
		match self {
			Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
			Self::Internal(_) | Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

/// Result alias used throughout the request pipeline.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(Error::InvalidRequest("bad".into()), StatusCode::BAD_REQUEST)]
	#[case(Error::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR)]
	fn test_status_code_mapping(#[case] error: Error, #[case] expected: StatusCode) {
		assert_eq!(error.status_code(), expected);
	}

	#[rstest]
	fn test_serialization_error_converts() {
		// Arrange
		let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();

		// Act
		let err: Error = json_err.into();

		// Assert
		assert!(matches!(err, Error::Serialization(_)));
		assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
	}
}
