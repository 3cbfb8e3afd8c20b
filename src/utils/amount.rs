//! Serde helpers for 256-bit style amounts carried as decimal strings on the wire.
//!
//! Services encode amounts as strings to survive JSON number precision limits.
//! Values are held as `u128` locally and accept either a string or a plain number
//! when decoding.

use serde::{Deserialize, Deserializer, Serializer, de::Error};

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
	Text(String),
	Number(u64),
}

fn parse_repr<E: Error>(repr: AmountRepr) -> Result<u128, E> {
	match repr {
		AmountRepr::Text(text) => text
			.parse::<u128>()
			.map_err(|e| E::custom(format!("invalid amount {:?}: {}", text, e))),
		AmountRepr::Number(n) => Ok(n as u128),
	}
}

/// `#[serde(with = "u128_string")]`
pub mod u128_string {
	use super::*;

	pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&value.to_string())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
		parse_repr(AmountRepr::deserialize(deserializer)?)
	}
}
