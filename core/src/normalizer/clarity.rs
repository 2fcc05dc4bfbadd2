//! Clarity values carried by events and transaction payloads.

use crate::{
	error::{DecodeError, MalformedEventError},
	types::ClarityRepr,
};
use clarity::vm::types::{
	CharType, ListData, OptionalData, ResponseData, SequenceData, TupleData, Value,
};
use itertools::Itertools;

/// Decodes a consensus serialized value that must span the whole input.
pub fn decode_value(data: &[u8]) -> Result<Value, DecodeError> {
	let (value, read) = Value::deserialize_read_count(&mut &data[..], None, false)
		.map_err(|error| DecodeError::Value(error.to_string()))?;
	match data.len().saturating_sub(read as usize) {
		0 => Ok(value),
		trailing => Err(DecodeError::TrailingBytes(trailing)),
	}
}

/// Clarity source representation, e.g. `(ok (tuple (a u1)))`.
///
/// Principals are quoted and lists are spelled out, everything else is
/// printed the way the VM prints it.
pub fn repr(value: &Value) -> String {
	match value {
		Value::Principal(principal) => format!("'{principal}"),
		Value::Optional(OptionalData { data: None }) => "none".to_string(),
		Value::Optional(OptionalData { data: Some(inner) }) => format!("(some {})", repr(inner)),
		Value::Response(ResponseData { committed, data }) => {
			let kind = if *committed { "ok" } else { "err" };
			format!("({kind} {})", repr(data))
		},
		Value::Sequence(SequenceData::List(ListData { data, .. })) if data.is_empty() => {
			"(list)".to_string()
		},
		Value::Sequence(SequenceData::List(ListData { data, .. })) => {
			format!("(list {})", data.iter().map(repr).join(" "))
		},
		Value::Tuple(TupleData { data_map, .. }) => format!(
			"(tuple {})",
			data_map
				.iter()
				.map(|(name, value)| format!("({name} {})", repr(value)))
				.join(" ")
		),
		other => other.to_string(),
	}
}

/// Address of a principal value, contract principals as `address.name`.
pub fn principal(value: &Value) -> Option<String> {
	match value {
		Value::Principal(principal) => Some(principal.to_string()),
		_ => None,
	}
}

pub fn tuple_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
	match value {
		Value::Tuple(tuple) => tuple.get(key).ok(),
		_ => None,
	}
}

pub fn as_u128(value: &Value) -> Option<u128> {
	match value {
		Value::UInt(value) => Some(*value),
		_ => None,
	}
}

pub fn as_string(value: &Value) -> Option<String> {
	match value {
		Value::Sequence(SequenceData::String(CharType::ASCII(ascii))) => {
			String::from_utf8(ascii.data.clone()).ok()
		},
		Value::Sequence(SequenceData::String(CharType::UTF8(utf8))) => {
			String::from_utf8(utf8.data.concat()).ok()
		},
		_ => None,
	}
}

/// Pairs a value with its repr, keeping the hex it was decoded from.
pub fn repr_pair(bytes: &[u8], value: &Value) -> ClarityRepr {
	ClarityRepr {
		hex: format!("0x{}", hex::encode(bytes)),
		repr: repr(value),
	}
}

/// Decodes `0x` prefixed hex into its representation pair.
pub fn decode_repr(
	field: &'static str,
	value: &str,
) -> Result<(Value, ClarityRepr), MalformedEventError> {
	let bytes = hex::decode(value.strip_prefix("0x").unwrap_or(value))
		.map_err(|source| MalformedEventError::Hex { field, source })?;
	let decoded =
		decode_value(&bytes).map_err(|source| MalformedEventError::Decode { field, source })?;
	let repr = repr_pair(&bytes, &decoded);
	Ok((decoded, repr))
}
