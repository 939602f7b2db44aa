//! Value codec: wire JSON plus base64 packing.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Result, StateError};
use crate::value::StateValue;

/// Renders `value` as wire JSON with both sentinels applied.
pub fn encode(value: &StateValue) -> Result<String> {
	serde_json::to_string(&value.to_wire_json()).map_err(|e| StateError::Encode(e.to_string()))
}

/// Parses wire JSON, reviving sentinels at every depth.
///
/// # Errors
///
/// [`StateError::ParseFailure`] for malformed or truncated input.
pub fn decode(encoded: &str) -> Result<StateValue> {
	serde_json::from_str::<serde_json::Value>(encoded)
		.map(StateValue::from_json)
		.map_err(|e| StateError::ParseFailure(e.to_string()))
}

/// Packs wire JSON into standard base64.
pub fn pack(encoded: &str) -> String {
	STANDARD.encode(encoded.as_bytes())
}

/// Reverses [`pack`].
pub fn unpack(packed: &str) -> Result<String> {
	let bytes = STANDARD
		.decode(packed)
		.map_err(|e| StateError::ParseFailure(format!("invalid packed entry: {e}")))?;
	String::from_utf8(bytes)
		.map_err(|e| StateError::ParseFailure(format!("packed entry is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_undefined_and_null_are_distinct_on_the_wire() {
		// Arrange
		let value = StateValue::object([
			("id", StateValue::from(2i64)),
			(
				"settings",
				StateValue::object([("theme", StateValue::Undefined), ("accent", StateValue::Null)]),
			),
		]);

		// Act
		let encoded = encode(&value).unwrap();

		// Assert
		assert_eq!(
			encoded,
			r#"{"id":2,"settings":{"theme":{"__EDGES_UNDEFINED__":true},"accent":{"__EDGES_NULL__":true}}}"#
		);
		assert_eq!(decode(&encoded).unwrap(), value);
	}

	#[rstest]
	fn test_plain_null_decodes_as_null() {
		assert_eq!(decode("[null]").unwrap(), StateValue::Array(vec![StateValue::Null]));
	}

	#[rstest]
	#[case("{\"a\":")]
	#[case("")]
	#[case("undefined")]
	fn test_decode_rejects_malformed(#[case] input: &str) {
		assert!(matches!(decode(input), Err(StateError::ParseFailure(_))));
	}

	#[rstest]
	fn test_pack_round_trip_multibyte() {
		let encoded = encode(&StateValue::from("こんにちは ✓")).unwrap();

		let packed = pack(&encoded);

		assert!(packed.is_ascii());
		assert_eq!(unpack(&packed).unwrap(), encoded);
	}

	#[rstest]
	fn test_unpack_rejects_garbage() {
		assert!(matches!(unpack("%%%"), Err(StateError::ParseFailure(_))));
	}
}
