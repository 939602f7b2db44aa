//! Dynamic value model for stored state.
//!
//! JSON has no `undefined`, and a missing key, an explicit `null` and an
//! `undefined` value must stay distinguishable at every nesting depth once
//! state crosses the wire. [`StateValue`] models all three; the wire form
//! replaces `undefined` and `null` with single-key sentinel objects.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::error::{Result, StateError};

/// Sentinel key standing in for `undefined` on the wire.
pub const UNDEFINED_SENTINEL: &str = "__EDGES_UNDEFINED__";

/// Sentinel key standing in for `null` on the wire.
pub const NULL_SENTINEL: &str = "__EDGES_NULL__";

/// A state value as stored in a request's state map.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StateValue {
	/// The value is explicitly `undefined` (present, but without a value).
	#[default]
	Undefined,
	/// The value is `null`.
	Null,
	/// A boolean.
	Bool(bool),
	/// A JSON number.
	Number(Number),
	/// A string.
	String(String),
	/// An ordered list.
	Array(Vec<StateValue>),
	/// An object; keys keep insertion order.
	Object(IndexMap<String, StateValue>),
}

impl StateValue {
	/// Build an object from key/value pairs.
	///
	/// # Examples
	///
	/// ```
	/// use edges_state::StateValue;
	///
	/// let settings = StateValue::object([("theme", StateValue::Undefined)]);
	/// assert!(settings.get("theme").unwrap().is_undefined());
	/// assert!(settings.get("missing").is_none());
	/// ```
	pub fn object<K, I>(entries: I) -> Self
	where
		K: Into<String>,
		I: IntoIterator<Item = (K, StateValue)>,
	{
		Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
	}

	/// Returns `true` for [`StateValue::Undefined`].
	pub fn is_undefined(&self) -> bool {
		matches!(self, Self::Undefined)
	}

	/// Returns `true` for [`StateValue::Null`].
	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	/// Looks up a field of an object value. `None` means the key is absent.
	pub fn get(&self, key: &str) -> Option<&StateValue> {
		match self {
			Self::Object(map) => map.get(key),
			_ => None,
		}
	}

	/// Whether `undefined` occurs anywhere inside this value.
	pub fn contains_undefined(&self) -> bool {
		match self {
			Self::Undefined => true,
			Self::Array(items) => items.iter().any(Self::contains_undefined),
			Self::Object(map) => map.values().any(Self::contains_undefined),
			_ => false,
		}
	}

	/// Converts a plain JSON value, reviving sentinel objects at every depth.
	pub fn from_json(value: Value) -> Self {
		match value {
			Value::Null => Self::Null,
			Value::Bool(b) => Self::Bool(b),
			Value::Number(n) => Self::Number(n),
			Value::String(s) => Self::String(s),
			Value::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
			Value::Object(map) => match revive_sentinel(&map) {
				Some(revived) => revived,
				None => Self::Object(
					map.into_iter()
						.map(|(k, v)| (k, Self::from_json(v)))
						.collect(),
				),
			},
		}
	}

	/// The wire form: `undefined` and `null` both become sentinel objects.
	///
	/// # Examples
	///
	/// ```
	/// use edges_state::StateValue;
	///
	/// let json = StateValue::Array(vec![StateValue::Null, StateValue::Undefined]).to_wire_json();
	/// assert_eq!(
	///     json.to_string(),
	///     r#"[{"__EDGES_NULL__":true},{"__EDGES_UNDEFINED__":true}]"#
	/// );
	/// ```
	pub fn to_wire_json(&self) -> Value {
		self.to_json_with(true)
	}

	/// The plain form used when reading into types that cannot express
	/// `undefined`: it becomes `null` inside arrays and is dropped from objects.
	fn to_plain_json(&self) -> Value {
		match self {
			Self::Undefined | Self::Null => Value::Null,
			Self::Array(items) => Value::Array(items.iter().map(Self::to_plain_json).collect()),
			Self::Object(map) => Value::Object(
				map.iter()
					.filter(|(_, v)| !v.is_undefined())
					.map(|(k, v)| (k.clone(), v.to_plain_json()))
					.collect(),
			),
			other => other.to_json_with(false),
		}
	}

	fn to_json_with(&self, wrap_null: bool) -> Value {
		match self {
			Self::Undefined => sentinel(UNDEFINED_SENTINEL),
			Self::Null if wrap_null => sentinel(NULL_SENTINEL),
			Self::Null => Value::Null,
			Self::Bool(b) => Value::Bool(*b),
			Self::Number(n) => Value::Number(n.clone()),
			Self::String(s) => Value::String(s.clone()),
			Self::Array(items) => {
				Value::Array(items.iter().map(|v| v.to_json_with(wrap_null)).collect())
			}
			Self::Object(map) => Value::Object(
				map.iter()
					.map(|(k, v)| (k.clone(), v.to_json_with(wrap_null)))
					.collect(),
			),
		}
	}
}

fn sentinel(key: &str) -> Value {
	let mut map = Map::with_capacity(1);
	map.insert(key.to_string(), Value::Bool(true));
	Value::Object(map)
}

fn revive_sentinel(map: &Map<String, Value>) -> Option<StateValue> {
	if map.len() != 1 {
		return None;
	}
	if map.get(UNDEFINED_SENTINEL) == Some(&Value::Bool(true)) {
		return Some(StateValue::Undefined);
	}
	if map.get(NULL_SENTINEL) == Some(&Value::Bool(true)) {
		return Some(StateValue::Null);
	}
	None
}

impl From<Value> for StateValue {
	fn from(value: Value) -> Self {
		Self::from_json(value)
	}
}

impl From<bool> for StateValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<i64> for StateValue {
	fn from(value: i64) -> Self {
		Self::Number(value.into())
	}
}

impl From<u64> for StateValue {
	fn from(value: u64) -> Self {
		Self::Number(value.into())
	}
}

impl From<f64> for StateValue {
	/// Non-finite floats have no JSON form and become `null`.
	fn from(value: f64) -> Self {
		Number::from_f64(value).map_or(Self::Null, Self::Number)
	}
}

impl From<&str> for StateValue {
	fn from(value: &str) -> Self {
		Self::String(value.to_string())
	}
}

impl From<String> for StateValue {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl From<Vec<StateValue>> for StateValue {
	fn from(value: Vec<StateValue>) -> Self {
		Self::Array(value)
	}
}

impl Serialize for StateValue {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		match self {
			Self::Undefined => {
				let mut map = serializer.serialize_map(Some(1))?;
				map.serialize_entry(UNDEFINED_SENTINEL, &true)?;
				map.end()
			}
			Self::Null => serializer.serialize_unit(),
			Self::Bool(b) => serializer.serialize_bool(*b),
			Self::Number(n) => n.serialize(serializer),
			Self::String(s) => serializer.serialize_str(s),
			Self::Array(items) => serializer.collect_seq(items),
			Self::Object(map) => serializer.collect_map(map),
		}
	}
}

impl<'de> Deserialize<'de> for StateValue {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		Value::deserialize(deserializer).map(Self::from_json)
	}
}

/// Types that can live in the state map.
///
/// Implemented for every `Serialize + DeserializeOwned` type, including
/// [`StateValue`] itself, which converts losslessly.
pub trait StateData: Sized {
	/// Convert into a stored value.
	fn to_state(&self) -> Result<StateValue>;

	/// Read back from a stored value.
	fn from_state(value: &StateValue) -> Result<Self>;
}

impl<T> StateData for T
where
	T: Serialize + DeserializeOwned,
{
	fn to_state(&self) -> Result<StateValue> {
		serde_json::to_value(self)
			.map(StateValue::from_json)
			.map_err(|e| StateError::Encode(e.to_string()))
	}

	fn from_state(value: &StateValue) -> Result<Self> {
		match serde_json::from_value(value.to_json_with(false)) {
			Ok(decoded) => Ok(decoded),
			Err(_) if value.contains_undefined() => serde_json::from_value(value.to_plain_json())
				.map_err(|e| StateError::Decode(e.to_string())),
			Err(e) => Err(StateError::Decode(e.to_string())),
		}
	}
}
