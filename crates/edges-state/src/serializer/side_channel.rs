//! The JSON side-channel form.
//!
//! JSON responses gain a top-level `__edges_state__` object mapping each
//! state key to its wire JSON as a string. Entries are never packed here.

use serde_json::{Map, Value};

use super::SerializedPayload;
use super::codec::decode;
use crate::error::{Result, StateError};
use crate::value::StateValue;

/// Reserved top-level field carrying state in JSON bodies.
pub const SIDE_CHANNEL_FIELD: &str = "__edges_state__";

/// Adds the side-channel field to a JSON object body.
///
/// Object key order is preserved and the field is appended last.
///
/// # Errors
///
/// [`StateError::SerializationFailure`] when `body` is not valid JSON or its
/// top level is not an object. Callers keep the original body in that case.
///
/// # Examples
///
/// ```
/// use edges_state::{SerializeOptions, SerializedPayload, StateValue, augment_json_body};
/// use indexmap::IndexMap;
///
/// let mut state = IndexMap::new();
/// state.insert("count::state::0".to_string(), StateValue::from(5i64));
/// let payload = SerializedPayload::encode(&state, &SerializeOptions::default()).unwrap();
///
/// let body = augment_json_body(br#"{"message":"ok"}"#, &payload).unwrap();
/// assert_eq!(body, br#"{"message":"ok","__edges_state__":{"count::state::0":"5"}}"#);
/// ```
pub fn augment_json_body(body: &[u8], payload: &SerializedPayload) -> Result<Vec<u8>> {
	let mut document: Value = serde_json::from_slice(body)
		.map_err(|e| StateError::SerializationFailure(format!("body is not JSON: {e}")))?;
	let Value::Object(fields) = &mut document else {
		return Err(StateError::SerializationFailure(
			"top-level JSON value is not an object".to_string(),
		));
	};

	let channel: Map<String, Value> = payload
		.entries()
		.iter()
		.map(|entry| (entry.key.clone(), Value::String(entry.encoded.clone())))
		.collect();
	fields.insert(SIDE_CHANNEL_FIELD.to_string(), Value::Object(channel));

	serde_json::to_vec(&document).map_err(|e| StateError::SerializationFailure(e.to_string()))
}

/// Decodes the value of a side-channel field.
///
/// # Errors
///
/// [`StateError::ParseFailure`] unless `channel` is an object whose values
/// are all strings holding valid wire JSON.
pub fn decode_side_channel(channel: &Value) -> Result<Vec<(String, StateValue)>> {
	let Value::Object(entries) = channel else {
		return Err(StateError::ParseFailure(format!(
			"{SIDE_CHANNEL_FIELD} is not an object"
		)));
	};
	entries
		.iter()
		.map(|(key, encoded)| {
			let encoded = encoded.as_str().ok_or_else(|| {
				StateError::ParseFailure(format!("entry `{key}` is not a string"))
			})?;
			Ok((key.clone(), decode(encoded)?))
		})
		.collect()
}

/// Finds and decodes the side channel of a complete JSON body.
///
/// Returns `Ok(None)` when the body is a JSON document without the field.
pub fn extract_side_channel(body: &[u8]) -> Result<Option<Vec<(String, StateValue)>>> {
	let document: Value =
		serde_json::from_slice(body).map_err(|e| StateError::ParseFailure(e.to_string()))?;
	document
		.get(SIDE_CHANNEL_FIELD)
		.map(decode_side_channel)
		.transpose()
}
