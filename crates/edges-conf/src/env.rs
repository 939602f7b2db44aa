//! Environment variable handling
//!
//! Typed, prefix-aware reads of environment variables. Parse failures report
//! the length of the offending value rather than the value itself.

use std::env;

/// Environment variable reader with optional prefix support
#[derive(Debug, Clone, Default)]
pub struct Env {
	/// Optional prefix for environment variables (e.g., "EDGES_")
	pub prefix: Option<String>,
}

impl Env {
	/// Create a reader without a prefix
	pub fn new() -> Self {
		Self::default()
	}

	/// Set a prefix for all environment variable lookups
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = Some(prefix.into());
		self
	}

	fn key_name(&self, key: &str) -> String {
		match &self.prefix {
			Some(prefix) => format!("{}{}", prefix, key),
			None => key.to_string(),
		}
	}

	fn raw(&self, key: &str) -> Result<Option<(String, String)>, EnvError> {
		let full_key = self.key_name(key);
		if key.is_empty() {
			return Err(EnvError::InvalidVariableName {
				name: full_key,
				reason: "key after the prefix is empty".to_string(),
			});
		}
		validate_name(&full_key)?;
		Ok(env::var(&full_key).ok().map(|val| (full_key, val)))
	}

	/// Read a string value, falling back to `default` when unset
	pub fn str_with_default(&self, key: &str, default: Option<&str>) -> Result<String, EnvError> {
		match self.raw(key)? {
			Some((_, val)) => Ok(val),
			None => default
				.map(str::to_string)
				.ok_or_else(|| EnvError::MissingVariable(self.key_name(key))),
		}
	}

	/// Read a boolean value, falling back to `default` when unset
	///
	/// Accepts `true/false`, `1/0`, `yes/no` and `on/off` in any case.
	pub fn bool_with_default(&self, key: &str, default: Option<bool>) -> Result<bool, EnvError> {
		match self.raw(key)? {
			Some((full_key, val)) => parse_bool(&val).map_err(|error| EnvError::ParseError {
				key: full_key,
				value_len: val.len(),
				error,
			}),
			None => default.ok_or_else(|| EnvError::MissingVariable(self.key_name(key))),
		}
	}

	/// Read an unsigned size value, falling back to `default` when unset
	pub fn usize_with_default(&self, key: &str, default: Option<usize>) -> Result<usize, EnvError> {
		match self.raw(key)? {
			Some((full_key, val)) => {
				val.trim()
					.parse::<usize>()
					.map_err(|e| EnvError::ParseError {
						key: full_key,
						value_len: val.len(),
						error: e.to_string(),
					})
			}
			None => default.ok_or_else(|| EnvError::MissingVariable(self.key_name(key))),
		}
	}
}

/// Parse a boolean flag the way shell configuration usually spells it.
pub fn parse_bool(value: &str) -> Result<bool, String> {
	match value.trim().to_ascii_lowercase().as_str() {
		"true" | "1" | "yes" | "on" => Ok(true),
		"false" | "0" | "no" | "off" | "" => Ok(false),
		other => Err(format!(
			"expected a boolean, got a {}-character value",
			other.len()
		)),
	}
}

/// Checks a settings variable name.
///
/// Names are shell-style: uppercase ASCII letters, digits and `_`, never
/// starting with a digit. `EDGES_COMPRESS` passes, `edges.compress` does not.
pub fn validate_name(name: &str) -> Result<(), EnvError> {
	let invalid = name
		.bytes()
		.position(|b| !(b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_'));
	let reason = match invalid {
		_ if name.is_empty() => "name is empty".to_string(),
		Some(pos) => format!("unexpected character at byte {pos}"),
		None if name.as_bytes()[0].is_ascii_digit() => "name starts with a digit".to_string(),
		None => return Ok(()),
	};
	Err(EnvError::InvalidVariableName {
		name: name.to_string(),
		reason,
	})
}

/// Environment variable errors
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
	/// The variable is unset and no default was supplied
	#[error("Missing environment variable: {0}")]
	MissingVariable(String),

	/// The variable is set but its value does not parse
	#[error("Failed to parse environment variable '{key}' (value length: {value_len}): {error}")]
	ParseError {
		/// Full variable name including prefix
		key: String,
		/// Length of the raw value
		value_len: usize,
		/// Parser message
		error: String,
	},

	/// The variable name itself is unusable
	#[error("Invalid environment variable name '{name}': {reason}")]
	InvalidVariableName {
		/// Offending name
		name: String,
		/// Why it was rejected
		reason: String,
	},
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serial_test::serial;

	#[rstest]
	#[serial]
	fn test_prefixed_bool() {
		// SAFETY: env mutation is serialized by #[serial].
		unsafe {
			env::set_var("EDGES_TEST_FLAG", "Yes");
		}
		let env = Env::new().with_prefix("EDGES_");

		assert!(env.bool_with_default("TEST_FLAG", Some(false)).unwrap());

		// SAFETY: env mutation is serialized by #[serial].
		unsafe {
			env::remove_var("EDGES_TEST_FLAG");
		}
	}

	#[rstest]
	#[serial]
	fn test_default_when_unset() {
		let env = Env::new().with_prefix("EDGES_");

		assert_eq!(env.usize_with_default("UNSET_SIZE", Some(1024)).unwrap(), 1024);
		assert!(matches!(
			env.usize_with_default("UNSET_SIZE", None),
			Err(EnvError::MissingVariable(name)) if name == "EDGES_UNSET_SIZE"
		));
	}

	#[rstest]
	#[serial]
	fn test_parse_error_does_not_leak_value() {
		// SAFETY: env mutation is serialized by #[serial].
		unsafe {
			env::set_var("EDGES_TEST_SIZE", "secret-ish");
		}
		let env = Env::new().with_prefix("EDGES_");

		let err = env.usize_with_default("TEST_SIZE", None).unwrap_err();
		let message = err.to_string();

		assert!(message.contains("value length: 10"));
		assert!(!message.contains("secret-ish"));

		// SAFETY: env mutation is serialized by #[serial].
		unsafe {
			env::remove_var("EDGES_TEST_SIZE");
		}
	}

	#[rstest]
	#[case("true", true)]
	#[case("ON", true)]
	#[case("0", false)]
	#[case("no", false)]
	fn test_parse_bool(#[case] input: &str, #[case] expected: bool) {
		assert_eq!(parse_bool(input).unwrap(), expected);
	}

	#[rstest]
	fn test_parse_bool_rejects_garbage() {
		assert!(parse_bool("maybe").is_err());
	}

	#[rstest]
	#[case("EDGES_COMPRESS")]
	#[case("EDGES_COMPRESS_THRESHOLD")]
	#[case("_EDGES2")]
	fn test_validate_name_accepts(#[case] name: &str) {
		assert!(validate_name(name).is_ok());
	}

	#[rstest]
	#[case("")]
	#[case("edges_compress")]
	#[case("EDGES-COMPRESS")]
	#[case("EDGES.COMPRESS")]
	#[case("2EDGES")]
	#[case("MY=VAR")]
	#[case("MY\x00VAR")]
	fn test_validate_name_rejects(#[case] name: &str) {
		assert!(matches!(
			validate_name(name),
			Err(EnvError::InvalidVariableName { .. })
		));
	}

	#[rstest]
	fn test_lowercase_key_is_rejected_before_lookup() {
		// Arrange
		let env = Env::new().with_prefix("EDGES_");

		// Act
		let lowercase = env.str_with_default("compress", Some("x"));
		let empty = env.str_with_default("", Some("x"));

		// Assert
		assert!(matches!(
			lowercase,
			Err(EnvError::InvalidVariableName { name, .. }) if name == "EDGES_compress"
		));
		assert!(matches!(empty, Err(EnvError::InvalidVariableName { .. })));
	}
}
