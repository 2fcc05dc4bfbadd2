//! Synthetic chain data for tests.
//!
//! Hashes are derived from labels with [`h`]: block `"b1"` has block hash
//! `h("b1")` and index block hash `h("index-b1")`.

use crate::{
	normalizer::{
		messages::{
			CoreNodeBlockMessage, CoreNodeBurnBlockMessage, CoreNodeEvent,
			CoreNodeMicroblockMessage, CoreNodeRewardRecipient, CoreNodeTxMessage,
		},
		transaction::{decode_transaction, encode},
	},
	types::{
		AssetEventType, Block, BlockUpdate, ClarityRepr, Confirmation, MempoolTx, Microblock,
		MicroblockUpdate, Network, NftEvent, PoxState, Record, StxEvent, Transaction, TxStatus,
		TxUpdate, ANCHORED_MICROBLOCK_SEQUENCE, H256,
	},
};
use serde_json::{json, Map, Value};
use stacks_common::util::hash::Sha512Trunc256Sum;

pub const NFT_ASSET: &str = "SP2PABAF9FTAJYNFZH93XENAJ8FVY99RRM50D2JG9.punks::punk";

const RECIPIENT: [u8; 20] = [0xee; 20];
const BURN_HEIGHT_OFFSET: u64 = 700_000;
const GENESIS_TIME: i64 = 1_700_000_000;

pub fn h(label: &str) -> H256 {
	H256(Sha512Trunc256Sum::from_data(label.as_bytes()).0)
}

pub fn zero() -> H256 {
	H256::zero()
}

fn index(label: &str) -> H256 {
	h(&format!("index-{label}"))
}

// Clarity encoding

pub fn clarity_uint(value: u128) -> Vec<u8> {
	let mut bytes = vec![0x01];
	bytes.extend_from_slice(&value.to_be_bytes());
	bytes
}

pub fn clarity_ascii(value: &str) -> Vec<u8> {
	let mut bytes = vec![0x0d];
	bytes.extend_from_slice(&(value.len() as u32).to_be_bytes());
	bytes.extend_from_slice(value.as_bytes());
	bytes
}

pub fn clarity_principal(version: u8, hash160: [u8; 20]) -> Vec<u8> {
	let mut bytes = vec![0x05, version];
	bytes.extend_from_slice(&hash160);
	bytes
}

pub fn clarity_tuple(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
	let mut bytes = vec![0x0c];
	bytes.extend_from_slice(&(entries.len() as u32).to_be_bytes());
	for (name, value) in entries {
		bytes.push(name.len() as u8);
		bytes.extend_from_slice(name.as_bytes());
		bytes.extend_from_slice(value);
	}
	bytes
}

fn hex_prefixed(bytes: &[u8]) -> String {
	format!("0x{}", hex::encode(bytes))
}

pub fn nft_value(value: u128) -> ClarityRepr {
	ClarityRepr {
		hex: hex_prefixed(&clarity_uint(value)),
		repr: format!("u{value}"),
	}
}

// Event observer payloads

pub fn transfer_raw(sender: u8, nonce: u64) -> Vec<u8> {
	encode::transaction(
		false,
		encode::standard_auth([sender; 20], nonce, 180),
		encode::token_transfer(RECIPIENT, 1000),
	)
}

fn tx_message(raw: Vec<u8>, tx_index: u32) -> CoreNodeTxMessage {
	CoreNodeTxMessage {
		txid: decode_transaction(&raw).expect("valid transaction").tx_id,
		tx_index,
		raw_tx: hex_prefixed(&raw),
		status: "success".to_string(),
		raw_result: "0x0703".to_string(),
		contract_abi: None,
		execution_cost: None,
		microblock_hash: None,
		microblock_sequence: None,
		microblock_parent_hash: None,
	}
}

pub fn transfer_tx(sender: u8, nonce: u64, tx_index: u32) -> CoreNodeTxMessage {
	tx_message(transfer_raw(sender, nonce), tx_index)
}

pub fn coinbase_tx(seed: u8, tx_index: u32) -> CoreNodeTxMessage {
	let raw = encode::transaction(false, encode::standard_auth([seed; 20], 0, 0), encode::coinbase(seed));
	tx_message(raw, tx_index)
}

pub fn contract_deploy_tx(sender: u8, tx_index: u32, name: &str) -> CoreNodeTxMessage {
	let raw = encode::transaction(
		false,
		encode::standard_auth([sender; 20], 0, 2000),
		encode::smart_contract(name, "(define-data-var count uint u0)"),
	);
	let mut message = tx_message(raw, tx_index);
	message.contract_abi = Some(json!({ "functions": [], "variables": [] }));
	message
}

pub fn microblock_tx(
	raw: Vec<u8>,
	tx_index: u32,
	microblock_hash: H256,
	microblock_sequence: i32,
	microblock_parent_hash: H256,
) -> CoreNodeTxMessage {
	let mut message = tx_message(raw, tx_index);
	message.microblock_hash = Some(microblock_hash);
	message.microblock_sequence = Some(microblock_sequence);
	message.microblock_parent_hash = Some(microblock_parent_hash);
	message
}

pub fn block_message(
	label: &str,
	height: u64,
	parent: Option<&str>,
	transactions: Vec<CoreNodeTxMessage>,
) -> CoreNodeBlockMessage {
	CoreNodeBlockMessage {
		block_hash: h(label),
		block_height: height,
		burn_block_time: GENESIS_TIME + height as i64,
		burn_block_hash: h(&format!("burn-{label}")),
		burn_block_height: BURN_HEIGHT_OFFSET + height,
		miner_txid: h(&format!("miner-{label}")),
		index_block_hash: index(label),
		parent_index_block_hash: parent.map(index).unwrap_or_default(),
		parent_block_hash: parent.map(h).unwrap_or_default(),
		parent_microblock: H256::zero(),
		parent_microblock_sequence: 0,
		parent_burn_block_hash: parent
			.map(|parent| h(&format!("burn-{parent}")))
			.unwrap_or_default(),
		parent_burn_block_height: BURN_HEIGHT_OFFSET + height.saturating_sub(1),
		parent_burn_block_timestamp: GENESIS_TIME + height.saturating_sub(1) as i64,
		events: vec![],
		transactions,
		matured_miner_rewards: vec![],
		anchored_cost: None,
		confirmed_microblocks_cost: None,
		pox_v1_unlock_height: None,
		pox_v2_unlock_height: None,
		pox_v3_unlock_height: None,
	}
}

pub fn microblocks_message(parent: &str, transactions: Vec<CoreNodeTxMessage>) -> CoreNodeMicroblockMessage {
	CoreNodeMicroblockMessage {
		parent_index_block_hash: index(parent),
		burn_block_hash: h(&format!("burn-{parent}")),
		burn_block_height: BURN_HEIGHT_OFFSET,
		burn_block_timestamp: GENESIS_TIME,
		events: vec![],
		transactions,
	}
}

pub fn burn_block_message(label: &str, height: u64, recipients: usize, slots: usize) -> CoreNodeBurnBlockMessage {
	CoreNodeBurnBlockMessage {
		burn_block_hash: h(label),
		burn_block_height: height,
		burn_amount: 20_000,
		reward_recipients: (0..recipients)
			.map(|n| CoreNodeRewardRecipient {
				recipient: format!("1BitcoinRecipient{n}"),
				amt: 1000,
			})
			.collect(),
		reward_slot_holders: (0..slots).map(|n| format!("1BitcoinSlotHolder{n}")).collect(),
	}
}

fn event(txid: H256, event_index: u32, kind: &str, body: Value) -> CoreNodeEvent {
	let mut map = Map::new();
	map.insert(kind.to_string(), body);
	CoreNodeEvent {
		txid,
		event_index,
		committed: true,
		kind: kind.to_string(),
		body: map,
	}
}

pub fn stx_transfer_event(txid: H256, event_index: u32) -> CoreNodeEvent {
	event(
		txid,
		event_index,
		"stx_transfer_event",
		json!({
			"sender": "SP1HTBVD3JG9C05J7HBJTHGR0GGW7KXW28M5JS8QE",
			"recipient": "SP3FBR2AGK5H9QBDH3EEN6DF8EK8JY7RX8QJ5SVTE",
			"amount": "10",
		}),
	)
}

pub fn nft_mint_event(txid: H256, event_index: u32, asset_identifier: &str, value: u128, recipient: &str) -> CoreNodeEvent {
	event(
		txid,
		event_index,
		"nft_mint_event",
		json!({
			"asset_identifier": asset_identifier,
			"recipient": recipient,
			"raw_value": nft_value(value).hex,
		}),
	)
}

pub fn pox_print_event(txid: H256, event_index: u32, network: Network) -> CoreNodeEvent {
	let mut value = vec![0x07];
	value.extend(clarity_tuple(&[
		("balance", clarity_uint(1000)),
		("burnchain-unlock-height", clarity_uint(2100)),
		("locked", clarity_uint(500)),
		("name", clarity_ascii("stack-stx")),
		("stacker", clarity_principal(22, [1u8; 20])),
	]));
	event(
		txid,
		event_index,
		"contract_event",
		json!({
			"contract_identifier": format!("{}.pox-4", network.boot_address()),
			"topic": "print",
			"raw_value": hex_prefixed(&value),
		}),
	)
}

// Domain rows

pub fn block(label: &str, height: u64, parent: Option<&str>) -> Block {
	Block {
		block_hash: h(label),
		index_block_hash: index(label),
		parent_index_block_hash: parent.map(index).unwrap_or_default(),
		parent_block_hash: parent.map(h).unwrap_or_default(),
		block_height: height,
		burn_block_hash: h(&format!("burn-{label}")),
		burn_block_height: BURN_HEIGHT_OFFSET + height,
		burn_block_time: GENESIS_TIME + height as i64,
		canonical: true,
		..Default::default()
	}
}

/// Anchored, canonical confirmation at position 0.
pub fn confirmation(tx_id: H256, index_block_hash: H256, block_height: u64) -> Confirmation {
	Confirmation {
		tx_id,
		block_height,
		index_block_hash,
		microblock_sequence: ANCHORED_MICROBLOCK_SEQUENCE,
		canonical: true,
		microblock_canonical: true,
		..Default::default()
	}
}

/// Token transfer with the given confirmation and no events.
pub fn tx_update(confirmation: Confirmation) -> TxUpdate {
	let body = decode_transaction(&transfer_raw(1, 0))
		.expect("valid transfer")
		.body;
	TxUpdate::new(Record::new(
		confirmation,
		Transaction {
			body,
			status: TxStatus::Success,
			raw_result: "0x0703".to_string(),
			execution_cost: Default::default(),
			event_count: 0,
		},
	))
}

pub fn stx_event(confirmation: Confirmation, event_index: u32) -> Record<StxEvent> {
	Record::new(
		confirmation,
		StxEvent {
			event_index,
			asset_event_type: AssetEventType::Transfer,
			sender: Some("SP1".to_string()),
			recipient: Some("SP2".to_string()),
			amount: 10,
			memo: None,
		},
	)
}

pub fn nft_event(
	confirmation: Confirmation,
	event_index: u32,
	asset_event_type: AssetEventType,
	recipient: &str,
) -> Record<NftEvent> {
	Record::new(
		confirmation,
		NftEvent {
			event_index,
			asset_event_type,
			asset_identifier: NFT_ASSET.to_string(),
			value: nft_value(1),
			sender: None,
			recipient: Some(recipient.to_string()),
		},
	)
}

pub fn mempool_tx(tx_id: H256, receipt_block_height: u64) -> MempoolTx {
	let body = decode_transaction(&transfer_raw(1, 0))
		.expect("valid transfer")
		.body;
	MempoolTx {
		tx_id,
		body,
		receipt_time: GENESIS_TIME,
		receipt_block_height,
		pruned: false,
		status: TxStatus::Pending,
	}
}

// Engine updates

/// Anchor block confirming the labelled transactions directly.
pub fn block_update(label: &str, height: u64, parent: Option<&str>, txs: &[&str]) -> BlockUpdate {
	let block = block(label, height, parent);
	let txs = txs
		.iter()
		.enumerate()
		.map(|(tx_index, tx)| {
			let mut confirmation = confirmation(h(tx), block.index_block_hash, height);
			confirmation.tx_index = tx_index as u32;
			confirmation.block_hash = block.block_hash;
			confirmation.parent_index_block_hash = block.parent_index_block_hash;
			confirmation.burn_block_time = block.burn_block_time;
			tx_update(confirmation)
		})
		.collect::<Vec<_>>();
	BlockUpdate {
		block: Block {
			tx_count: txs.len() as u32,
			..block
		},
		microblocks: vec![],
		txs,
		miner_rewards: vec![],
		pox_state: PoxState::default(),
	}
}

/// Unconfirmed microblock extending the labelled anchor block.
pub fn microblock(label: &str, sequence: i32, parent_hash: H256, anchor: &str) -> Microblock {
	Microblock {
		microblock_hash: h(label),
		microblock_sequence: sequence,
		microblock_parent_hash: parent_hash,
		parent_index_block_hash: index(anchor),
		canonical: true,
		microblock_canonical: true,
		..Default::default()
	}
}

/// Unconfirmed transaction carried by `microblock`.
pub fn streamed_tx(tx: &str, microblock: &Microblock) -> TxUpdate {
	let mut confirmation = confirmation(h(tx), H256::zero(), microblock.block_height);
	confirmation.microblock_hash = microblock.microblock_hash;
	confirmation.microblock_sequence = microblock.microblock_sequence;
	confirmation.parent_index_block_hash = microblock.parent_index_block_hash;
	let mut update = tx_update(confirmation);
	update.microblock_parent_hash = microblock.microblock_parent_hash;
	update
}

/// Microblock batch with one labelled transaction per microblock.
pub fn microblock_update(anchor: &str, stream: &[(&Microblock, &str)]) -> MicroblockUpdate {
	MicroblockUpdate {
		parent_index_block_hash: index(anchor),
		microblocks: stream.iter().map(|(microblock, _)| (*microblock).clone()).collect(),
		txs: stream
			.iter()
			.map(|(microblock, tx)| streamed_tx(tx, microblock))
			.collect(),
	}
}
