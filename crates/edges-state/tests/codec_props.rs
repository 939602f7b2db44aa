//! Round-trip properties of the transfer encoding.

use edges_state::{
	SerializeOptions, SerializedPayload, StateValue, decode, encode, pack, parse_script_payload,
	unpack,
};
use indexmap::IndexMap;
use proptest::prelude::*;

fn state_value() -> impl Strategy<Value = StateValue> {
	let leaf = prop_oneof![
		Just(StateValue::Undefined),
		Just(StateValue::Null),
		any::<bool>().prop_map(StateValue::from),
		any::<i64>().prop_map(StateValue::from),
		any::<u64>().prop_map(StateValue::from),
		".*".prop_map(StateValue::from),
	];
	leaf.prop_recursive(4, 64, 6, |inner| {
		prop_oneof![
			prop::collection::vec(inner.clone(), 0..6).prop_map(StateValue::Array),
			prop::collection::vec(("[a-z][a-z0-9_]{0,7}", inner), 0..6)
				.prop_map(|fields| StateValue::Object(fields.into_iter().collect())),
		]
	})
}

proptest! {
	#[test]
	fn prop_decode_inverts_encode(value in state_value()) {
		let encoded = encode(&value).unwrap();
		prop_assert_eq!(decode(&encoded).unwrap(), value);
	}

	#[test]
	fn prop_packed_entries_round_trip(value in state_value()) {
		let encoded = encode(&value).unwrap();
		let packed = pack(&encoded);
		prop_assert_eq!(decode(&unpack(&packed).unwrap()).unwrap(), value);
	}

	#[test]
	fn prop_script_round_trip(
		values in prop::collection::vec(state_value(), 1..5),
		compress in any::<bool>(),
		threshold in 0usize..64,
	) {
		let state: IndexMap<String, StateValue> = values
			.into_iter()
			.enumerate()
			.map(|(i, v)| (format!("ns::state::{i}"), v))
			.collect();
		let options = SerializeOptions { compress, threshold };

		let script = SerializedPayload::encode(&state, &options).unwrap().to_script();
		let parsed: IndexMap<String, StateValue> =
			parse_script_payload(&script).unwrap().into_iter().collect();

		prop_assert_eq!(parsed, state);
	}
}
