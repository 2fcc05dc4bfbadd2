//! Stacks transactions, decoded with the node's own consensus codec.

use super::clarity::repr_pair;
use crate::{
	error::DecodeError,
	types::{
		AnchorMode, AssetInfo, ClarityRepr, FungibleConditionCode, Network,
		NonFungibleConditionCode, PostCondition, PostConditionMode, PostConditionPrincipal,
		TxBody, TxPayload, H256,
	},
};
use blockstack_lib::chainstate::stacks::{
	self as stacks, StacksTransaction, TransactionAnchorMode, TransactionPayload,
	TransactionPostCondition, TransactionPostConditionMode, TransactionVersion,
};
use clarity::vm::{types::Value, ClarityVersion};
use stacks_common::codec::StacksMessageCodec;

/// Fully decoded transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedTransaction {
	pub tx_id: H256,
	pub network: Network,
	pub chain_id: u32,
	pub body: TxBody,
}

pub fn decode_transaction(raw_tx: &[u8]) -> Result<DecodedTransaction, DecodeError> {
	let mut cursor = raw_tx;
	let tx = StacksTransaction::consensus_deserialize(&mut cursor)
		.map_err(|error| DecodeError::Transaction(error.to_string()))?;
	if !cursor.is_empty() {
		return Err(DecodeError::TrailingBytes(cursor.len()));
	}

	let network = match tx.version {
		TransactionVersion::Mainnet => Network::Mainnet,
		TransactionVersion::Testnet => Network::Testnet,
	};
	let sender_address = tx.origin_address().to_string();
	let payload = payload(&tx.payload, &sender_address)?;

	let body = TxBody {
		raw_tx: raw_tx.to_vec(),
		tx_type: payload.tx_type(),
		sponsor_address: tx.sponsor_address().map(|address| address.to_string()),
		sender_address,
		nonce: tx.get_origin_nonce(),
		// sponsored transactions carry the fee on the sponsor condition
		fee_rate: tx.get_tx_fee(),
		anchor_mode: match tx.anchor_mode {
			TransactionAnchorMode::OnChainOnly => AnchorMode::OnChainOnly,
			TransactionAnchorMode::OffChainOnly => AnchorMode::OffChainOnly,
			TransactionAnchorMode::Any => AnchorMode::Any,
		},
		post_condition_mode: match tx.post_condition_mode {
			TransactionPostConditionMode::Allow => PostConditionMode::Allow,
			TransactionPostConditionMode::Deny => PostConditionMode::Deny,
		},
		post_conditions: tx.post_conditions.iter().map(post_condition).collect(),
		payload,
	};

	Ok(DecodedTransaction {
		tx_id: H256(tx.txid().0),
		network,
		chain_id: tx.chain_id,
		body,
	})
}

fn hex_of(bytes: &[u8]) -> String {
	format!("0x{}", hex::encode(bytes))
}

fn encoded<T: StacksMessageCodec>(item: &T) -> String {
	hex_of(&StacksMessageCodec::serialize_to_vec(item))
}

fn clarity_repr(value: &Value) -> ClarityRepr {
	repr_pair(&StacksMessageCodec::serialize_to_vec(value), value)
}

fn principal(principal: &stacks::PostConditionPrincipal) -> PostConditionPrincipal {
	match principal {
		stacks::PostConditionPrincipal::Origin => PostConditionPrincipal::Origin,
		stacks::PostConditionPrincipal::Standard(address) => PostConditionPrincipal::Standard {
			address: address.to_string(),
		},
		stacks::PostConditionPrincipal::Contract(address, contract_name) => {
			PostConditionPrincipal::Contract {
				address: address.to_string(),
				contract_name: contract_name.to_string(),
			}
		},
	}
}

fn asset_info(asset: &stacks::AssetInfo) -> AssetInfo {
	AssetInfo {
		contract_address: asset.contract_address.to_string(),
		contract_name: asset.contract_name.to_string(),
		asset_name: asset.asset_name.to_string(),
	}
}

fn fungible_code(code: &stacks::FungibleConditionCode) -> FungibleConditionCode {
	match code {
		stacks::FungibleConditionCode::SentEq => FungibleConditionCode::SentEq,
		stacks::FungibleConditionCode::SentGt => FungibleConditionCode::SentGt,
		stacks::FungibleConditionCode::SentGe => FungibleConditionCode::SentGe,
		stacks::FungibleConditionCode::SentLt => FungibleConditionCode::SentLt,
		stacks::FungibleConditionCode::SentLe => FungibleConditionCode::SentLe,
	}
}

fn post_condition(condition: &TransactionPostCondition) -> PostCondition {
	match condition {
		TransactionPostCondition::STX(owner, code, amount) => PostCondition::Stx {
			principal: principal(owner),
			condition_code: fungible_code(code),
			amount: u128::from(*amount),
		},
		TransactionPostCondition::Fungible(owner, asset, code, amount) => PostCondition::Fungible {
			principal: principal(owner),
			asset: asset_info(asset),
			condition_code: fungible_code(code),
			amount: u128::from(*amount),
		},
		TransactionPostCondition::Nonfungible(owner, asset, value, code) => {
			PostCondition::NonFungible {
				principal: principal(owner),
				asset: asset_info(asset),
				asset_value: clarity_repr(value),
				condition_code: if *code == stacks::NonfungibleConditionCode::Sent {
					NonFungibleConditionCode::Sent
				} else {
					NonFungibleConditionCode::NotSent
				},
			}
		},
	}
}

fn clarity_version(version: &ClarityVersion) -> u8 {
	match version {
		ClarityVersion::Clarity1 => 1,
		ClarityVersion::Clarity2 => 2,
		#[allow(unreachable_patterns)]
		_ => 3,
	}
}

fn payload(payload: &TransactionPayload, sender_address: &str) -> Result<TxPayload, DecodeError> {
	let payload = match payload {
		TransactionPayload::TokenTransfer(recipient, amount, memo) => TxPayload::TokenTransfer {
			recipient: recipient.to_string(),
			amount: u128::from(*amount),
			memo: hex_of(&memo.0),
		},
		TransactionPayload::SmartContract(contract, version) => TxPayload::SmartContract {
			contract_id: format!("{sender_address}.{}", contract.name),
			clarity_version: version.as_ref().map(clarity_version),
			source_code: contract.code_body.to_string(),
		},
		TransactionPayload::ContractCall(call) => TxPayload::ContractCall {
			contract_id: format!("{}.{}", call.address, call.contract_name),
			function_name: call.function_name.to_string(),
			function_args: call.function_args.iter().map(clarity_repr).collect(),
		},
		TransactionPayload::PoisonMicroblock(header_1, header_2) => TxPayload::PoisonMicroblock {
			microblock_header_1: encoded(header_1),
			microblock_header_2: encoded(header_2),
		},
		TransactionPayload::Coinbase(coinbase, alt_recipient, vrf_proof) => TxPayload::Coinbase {
			payload: hex_of(&coinbase.0),
			alt_recipient: alt_recipient.as_ref().map(|recipient| recipient.to_string()),
			vrf_proof: vrf_proof.as_ref().map(|proof| hex_of(&proof.to_bytes())),
		},
		TransactionPayload::TenureChange(tenure) => TxPayload::TenureChange {
			tenure_consensus_hash: hex::encode(tenure.tenure_consensus_hash.0),
			prev_tenure_consensus_hash: hex::encode(tenure.prev_tenure_consensus_hash.0),
			burn_view_consensus_hash: hex::encode(tenure.burn_view_consensus_hash.0),
			previous_tenure_end: H256(tenure.previous_tenure_end.0),
			previous_tenure_blocks: tenure.previous_tenure_blocks,
			cause: tenure.cause.clone() as u8,
			pubkey_hash: hex::encode(tenure.pubkey_hash.0),
		},
		#[allow(unreachable_patterns)]
		other => return Err(DecodeError::UnsupportedPayload(format!("{other:?}"))),
	};
	Ok(payload)
}


#[cfg(test)]
mod tests {
	use super::{decode_transaction, encode};
	use crate::{
		error::DecodeError,
		types::{AnchorMode, Network, PostConditionMode, TxPayload, TxType},
	};
	use stacks_common::{
		address::{
			c32::c32_address, C32_ADDRESS_VERSION_MAINNET_SINGLESIG,
			C32_ADDRESS_VERSION_TESTNET_SINGLESIG,
		},
		util::hash::Sha512Trunc256Sum,
	};

	fn mainnet(hash160: [u8; 20]) -> String {
		c32_address(C32_ADDRESS_VERSION_MAINNET_SINGLESIG, &hash160).unwrap()
	}

	fn testnet(hash160: [u8; 20]) -> String {
		c32_address(C32_ADDRESS_VERSION_TESTNET_SINGLESIG, &hash160).unwrap()
	}

	#[test]
	fn token_transfer() {
		let raw = encode::transaction(
			false,
			encode::standard_auth([1u8; 20], 7, 180),
			encode::token_transfer([2u8; 20], 1000),
		);
		let tx = decode_transaction(&raw).unwrap();

		assert_eq!(tx.network, Network::Mainnet);
		assert_eq!(tx.chain_id, 1);
		assert_eq!(tx.tx_id.0, Sha512Trunc256Sum::from_data(&raw).0);
		assert_eq!(tx.body.tx_type, TxType::TokenTransfer);
		assert_eq!(tx.body.sender_address, mainnet([1u8; 20]));
		assert_eq!(tx.body.nonce, 7);
		assert_eq!(tx.body.fee_rate, 180);
		assert_eq!(tx.body.anchor_mode, AnchorMode::OnChainOnly);
		assert_eq!(tx.body.post_condition_mode, PostConditionMode::Deny);
		assert!(tx.body.post_conditions.is_empty());
		assert!(!tx.body.sponsored());
		assert_eq!(
			tx.body.payload,
			TxPayload::TokenTransfer {
				recipient: mainnet([2u8; 20]),
				amount: 1000,
				memo: format!("0x{}", "00".repeat(34)),
			}
		);
	}

	#[test]
	fn sponsored_fee_comes_from_sponsor() {
		let raw = encode::transaction(
			true,
			encode::sponsored_auth([1u8; 20], [3u8; 20], 500),
			encode::coinbase(9),
		);
		let tx = decode_transaction(&raw).unwrap();

		assert_eq!(tx.network, Network::Testnet);
		assert_eq!(tx.body.fee_rate, 500);
		assert_eq!(tx.body.sender_address, testnet([1u8; 20]));
		assert_eq!(tx.body.sponsor_address, Some(testnet([3u8; 20])));
		assert_eq!(tx.body.tx_type, TxType::Coinbase);
	}

	#[test]
	fn contract_call_arguments() {
		let raw = encode::transaction(
			false,
			encode::standard_auth([1u8; 20], 0, 1),
			encode::contract_call([4u8; 20], "pool", "deposit"),
		);
		let tx = decode_transaction(&raw).unwrap();
		let TxPayload::ContractCall {
			contract_id,
			function_name,
			function_args,
		} = tx.body.payload
		else {
			panic!("Expected contract call");
		};

		assert_eq!(contract_id, format!("{}.pool", mainnet([4u8; 20])));
		assert_eq!(function_name, "deposit");
		assert_eq!(function_args.len(), 1);
		assert_eq!(function_args[0].repr, "u7");
		assert_eq!(function_args[0].hex, "0x0100000000000000000000000000000007");
	}

	#[test]
	fn versioned_smart_contract() {
		let raw = encode::transaction(
			false,
			encode::standard_auth([5u8; 20], 0, 1),
			encode::smart_contract("counter", "(define-data-var n uint u0)"),
		);
		let tx = decode_transaction(&raw).unwrap();

		assert_eq!(
			tx.body.payload,
			TxPayload::SmartContract {
				contract_id: format!("{}.counter", mainnet([5u8; 20])),
				clarity_version: Some(2),
				source_code: "(define-data-var n uint u0)".to_string(),
			}
		);
	}

	#[test]
	fn tx_id_depends_on_bytes() {
		let first = encode::transaction(false, encode::standard_auth([1u8; 20], 0, 1), encode::coinbase(1));
		let second = encode::transaction(false, encode::standard_auth([1u8; 20], 0, 1), encode::coinbase(2));
		assert_ne!(
			decode_transaction(&first).unwrap().tx_id,
			decode_transaction(&second).unwrap().tx_id
		);
	}

	#[test]
	fn truncated_transaction_fails() {
		let raw = encode::transaction(false, encode::standard_auth([1u8; 20], 0, 1), encode::coinbase(1));
		assert!(matches!(
			decode_transaction(&raw[..raw.len() - 1]),
			Err(DecodeError::Transaction(_))
		));
	}

	#[test]
	fn trailing_bytes_fail() {
		let mut raw = encode::transaction(false, encode::standard_auth([1u8; 20], 0, 1), encode::coinbase(1));
		raw.extend_from_slice(&[0, 0]);
		assert_eq!(decode_transaction(&raw), Err(DecodeError::TrailingBytes(2)));
	}

	#[test]
	fn unknown_payload_fails() {
		let raw = encode::transaction(false, encode::standard_auth([1u8; 20], 0, 1), vec![0x7f]);
		assert!(matches!(decode_transaction(&raw), Err(DecodeError::Transaction(_))));
	}
}
