//! Client-side errors.
//!
//! Every variant is recoverable: the payload is dropped and existing client
//! state stays as it was.

use edges_state::StateError;

/// Errors raised while rehydrating state in the browser.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
	/// A script or side-channel payload was malformed or truncated.
	#[error("invalid state payload: {0}")]
	Payload(#[from] StateError),

	/// A streamed side channel grew past the scanner's limit.
	#[error("side channel exceeds {limit} bytes")]
	SideChannelTooLarge {
		/// Configured limit in bytes
		limit: usize,
	},

	/// The underlying fetch failed.
	#[error("fetch failed: {0}")]
	Fetch(String),

	/// A DOM API was unavailable or threw.
	#[error("DOM error: {0}")]
	Dom(String),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
