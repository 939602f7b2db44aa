//! Error types for request-scoped state.

use std::fmt;

/// Why no request context could be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
	/// No resolver has been installed in the context registry yet.
	NotInstalled,
	/// A resolver is installed but the caller is not inside a request scope.
	OutsideScope,
	/// The request that owned a cell has already completed.
	Expired,
}

impl fmt::Display for UnavailableReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NotInstalled => write!(
				f,
				"no context resolver is installed; call `edges_state::install_default()` \
				 (or install a resolver) at startup before creating request state"
			),
			Self::OutsideScope => write!(
				f,
				"request state was accessed outside of a request scope; create state inside \
				 a handler wrapped by `StateMiddleware` or `edges_state::scope`, never at \
				 module load or in a detached task (use `edges_state::spawn`)"
			),
			Self::Expired => write!(
				f,
				"the request this state belongs to has completed; do not keep cells \
				 beyond the response"
			),
		}
	}
}

/// Errors raised by the state store, providers and serializer.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
	/// State was touched where no request context exists. Programmer error.
	#[error("request context unavailable: {0}")]
	ContextUnavailable(UnavailableReason),

	/// [`ContextRegistry::install`](crate::ContextRegistry::install) was called twice.
	#[error("a context resolver is already installed")]
	AlreadyInstalled,

	/// A value could not be converted into a [`StateValue`](crate::StateValue).
	#[error("failed to encode state value: {0}")]
	Encode(String),

	/// A stored value could not be read back as the requested type.
	#[error("failed to decode state value: {0}")]
	Decode(String),

	/// A response could not be augmented with serialized state.
	#[error("state serialization failed: {0}")]
	SerializationFailure(String),

	/// A rehydration payload was malformed or truncated.
	#[error("invalid rehydration payload: {0}")]
	ParseFailure(String),

	/// A provider name is cached with an instance of another type.
	#[error("provider '{name}' is cached with an instance of a different type")]
	ProviderTypeMismatch {
		/// Provider cache key
		name: String,
	},

	/// A derived cell was read before every source produced a value.
	#[error("derived state unresolved: {pending} of {total} sources have not emitted")]
	Unresolved {
		/// Sources still without a value
		pending: usize,
		/// Total number of sources
		total: usize,
	},
}

impl StateError {
	/// Whether this error is the fail-fast context misuse error.
	pub fn is_context_unavailable(&self) -> bool {
		matches!(self, Self::ContextUnavailable(_))
	}
}

/// Result alias for state operations.
pub type Result<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_context_unavailable_message_is_actionable() {
		let err = StateError::ContextUnavailable(UnavailableReason::OutsideScope);
		let message = err.to_string();

		assert!(err.is_context_unavailable());
		assert!(message.contains("StateMiddleware"));
		assert!(message.contains("module load"));
	}

	#[test]
	fn test_not_installed_message_names_the_fix() {
		let err = StateError::ContextUnavailable(UnavailableReason::NotInstalled);
		assert!(err.to_string().contains("install_default"));
	}
}
