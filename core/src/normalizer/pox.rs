use super::clarity::{as_string, as_u128, principal, repr, tuple_get};
use crate::types::{Network, PoxEvent};
use clarity::vm::types::{ResponseData, Value};

const POX_CONTRACTS: [&str; 3] = ["pox-2", "pox-3", "pox-4"];

/// Name of the PoX boot contract that emitted a log, if it is one.
pub fn pox_contract_name<'a>(contract_identifier: &'a str, network: Network) -> Option<&'a str> {
	let (address, name) = contract_identifier.split_once('.')?;
	(address == network.boot_address() && POX_CONTRACTS.contains(&name)).then_some(name)
}

/// Decodes `(ok (tuple (name ..) (stacker ..) (balance ..) (locked ..) (burnchain-unlock-height ..)))`.
///
/// Failed operations print `(err ..)` and produce no event.
pub fn decode_pox_event(pox_contract: &str, value: &Value, event_index: u32) -> Option<PoxEvent> {
	let Value::Response(ResponseData {
		committed: true,
		data: tuple,
	}) = value
	else {
		return None;
	};

	let uint = |key: &str| tuple_get(tuple, key).and_then(as_u128);

	let burnchain_unlock_height = uint("burnchain-unlock-height")?;
	Some(PoxEvent {
		event_index,
		pox_contract: pox_contract.to_string(),
		name: as_string(tuple_get(tuple, "name")?)?,
		stacker: principal(tuple_get(tuple, "stacker")?)?,
		balance: uint("balance")?,
		locked: uint("locked")?,
		burnchain_unlock_height: u64::try_from(burnchain_unlock_height).ok()?,
		data: tuple_get(tuple, "data").map(repr).unwrap_or_default(),
	})
}

#[cfg(test)]
mod tests {
	use super::{decode_pox_event, pox_contract_name};
	use crate::{
		fixtures::{clarity_ascii, clarity_principal, clarity_tuple, clarity_uint},
		normalizer::clarity::decode_value,
		types::Network,
	};
	use clarity::vm::types::Value;
	use test_case::test_case;

	#[test_case("SP000000000000000000002Q6VF78.pox-4", Network::Mainnet, Some("pox-4"))]
	#[test_case("SP000000000000000000002Q6VF78.pox-3", Network::Mainnet, Some("pox-3"))]
	#[test_case("ST000000000000000000002AMW42H.pox-2", Network::Testnet, Some("pox-2"))]
	#[test_case("SP000000000000000000002Q6VF78.pox-4", Network::Testnet, None)]
	#[test_case("SP000000000000000000002Q6VF78.pox", Network::Mainnet, None)]
	#[test_case("SP000000000000000000002Q6VF78", Network::Mainnet, None)]
	fn boot_contract_detection(contract: &str, network: Network, expected: Option<&str>) {
		assert_eq!(pox_contract_name(contract, network), expected);
	}

	fn print_value(name: &str) -> Value {
		let mut bytes = vec![0x07];
		bytes.extend(clarity_tuple(&[
			("balance", clarity_uint(1000)),
			("burnchain-unlock-height", clarity_uint(2100)),
			("data", clarity_tuple(&[("lock-period", clarity_uint(6))])),
			("locked", clarity_uint(500)),
			("name", clarity_ascii(name)),
			("stacker", clarity_principal(22, [0u8; 20])),
		]));
		decode_value(&bytes).unwrap()
	}

	#[test]
	fn decodes_stacking_print() {
		let event = decode_pox_event("pox-4", &print_value("stack-stx"), 3).unwrap();
		assert_eq!(event.name, "stack-stx");
		assert_eq!(event.stacker, "SP000000000000000000002Q6VF78");
		assert_eq!(event.balance, 1000);
		assert_eq!(event.locked, 500);
		assert_eq!(event.burnchain_unlock_height, 2100);
		assert_eq!(event.data, "(tuple (lock-period u6))");
		assert_eq!(event.event_index, 3);
	}

	#[test]
	fn ignores_failed_operations() {
		// (err 4)
		let mut bytes = vec![0x08, 0x00];
		bytes.extend_from_slice(&4i128.to_be_bytes());
		let value = decode_value(&bytes).unwrap();
		assert_eq!(decode_pox_event("pox-4", &value, 0), None);
	}

	#[test]
	fn ignores_prints_missing_fields() {
		let mut bytes = vec![0x07];
		bytes.extend(clarity_tuple(&[("name", clarity_ascii("stack-stx"))]));
		let value = decode_value(&bytes).unwrap();
		assert_eq!(decode_pox_event("pox-4", &value, 0), None);
	}
}
