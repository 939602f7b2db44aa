//! Settings consumed by the serializer and the request-scope middleware.

use serde::{Deserialize, Serialize};

use crate::env::{Env, EnvError};

/// Default size, in bytes, above which an encoded entry is packed.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 1024;

/// Prefix shared by every Edges environment variable.
pub const ENV_PREFIX: &str = "EDGES_";

/// State transfer settings.
///
/// | Field | Environment variable | Default |
/// |-------|----------------------|---------|
/// | `compress` | `EDGES_COMPRESS` | `false` |
/// | `compress_threshold` | `EDGES_COMPRESS_THRESHOLD` | `1024` |
/// | `silence_devtools_probe` | `EDGES_SILENCE_DEVTOOLS_PROBE` | `false` |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
	/// Pack large entries of the embedded script payload as base64.
	pub compress: bool,
	/// Encoded length above which an entry is packed.
	pub compress_threshold: usize,
	/// Answer the browser devtools probe with `204 No Content`.
	pub silence_devtools_probe: bool,
}

impl Default for StateSettings {
	fn default() -> Self {
		Self {
			compress: false,
			compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
			silence_devtools_probe: false,
		}
	}
}

impl StateSettings {
	/// Load settings from `EDGES_*` environment variables.
	///
	/// Unset variables keep their defaults.
	///
	/// # Errors
	///
	/// Returns [`SettingsError::Env`] when a variable is set to an unparsable value.
	pub fn from_env() -> Result<Self, SettingsError> {
		Self::from_env_with(&Env::new().with_prefix(ENV_PREFIX))
	}

	/// Load settings through a caller-provided [`Env`].
	pub fn from_env_with(env: &Env) -> Result<Self, SettingsError> {
		let defaults = Self::default();
		Ok(Self {
			compress: env.bool_with_default("COMPRESS", Some(defaults.compress))?,
			compress_threshold: env
				.usize_with_default("COMPRESS_THRESHOLD", Some(defaults.compress_threshold))?,
			silence_devtools_probe: env.bool_with_default(
				"SILENCE_DEVTOOLS_PROBE",
				Some(defaults.silence_devtools_probe),
			)?,
		})
	}

	/// Parse settings from a TOML document.
	///
	/// The document may hold the fields at the top level or under an
	/// `[edges]` table.
	///
	/// # Examples
	///
	/// ```
	/// use edges_conf::StateSettings;
	///
	/// let settings = StateSettings::from_toml_str("[edges]\ncompress = true\n").unwrap();
	/// assert!(settings.compress);
	/// assert_eq!(settings.compress_threshold, 1024);
	/// ```
	pub fn from_toml_str(source: &str) -> Result<Self, SettingsError> {
		#[derive(Deserialize)]
		struct Wrapped {
			edges: StateSettings,
		}

		let table: toml::Table = source.parse()?;
		if table.contains_key("edges") {
			let wrapped: Wrapped = toml::from_str(source)?;
			return Ok(wrapped.edges);
		}
		Ok(toml::from_str(source)?)
	}

	/// Enable or disable packing
	pub fn with_compress(mut self, compress: bool) -> Self {
		self.compress = compress;
		self
	}

	/// Set the packing threshold
	pub fn with_compress_threshold(mut self, threshold: usize) -> Self {
		self.compress_threshold = threshold;
		self
	}

	/// Enable or disable the devtools probe short-circuit
	pub fn with_silence_devtools_probe(mut self, silence: bool) -> Self {
		self.silence_devtools_probe = silence;
		self
	}
}

/// Errors raised while loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	/// An environment variable could not be read
	#[error(transparent)]
	Env(#[from] EnvError),

	/// A TOML document could not be parsed
	#[error("Invalid settings file: {0}")]
	Toml(#[from] toml::de::Error),
}
