//! Turns event observer payloads into domain updates. Pure, no I/O.

use crate::{
	error::{DecodeError, MalformedEventError},
	types::{
		AssetEventType, Block, BlockUpdate, BurnBlockUpdate, BurnchainReward, Confirmation,
		ContractLog, DropReason, FtEvent, MempoolDrop, MempoolTx, Microblock, MicroblockUpdate,
		MinerReward, Network, NftEvent, PoxState, Record, RewardSlotHolder, SmartContract,
		StxEvent, StxLockEvent, Transaction, TxPayload, TxStatus, TxUpdate,
		ANCHORED_MICROBLOCK_SEQUENCE, H256,
	},
};
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde_json::Value;
use stacks_common::types::chainstate::{BlockHeaderHash, ConsensusHash, StacksBlockId};
use std::{collections::HashMap, str::FromStr};
use tracing::debug;

pub mod clarity;
pub mod messages;
pub mod pox;
pub mod transaction;

use messages::{
	ContractEventBody, CoreNodeBlockMessage, CoreNodeBurnBlockMessage,
	CoreNodeDropMempoolTxMessage, CoreNodeEvent, CoreNodeMicroblockMessage, CoreNodeTxMessage,
	FtEventBody, NftEventBody, StxBurnEventBody, StxLockEventBody, StxMintEventBody,
	StxTransferEventBody,
};

fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, MalformedEventError> {
	hex::decode(value.strip_prefix("0x").unwrap_or(value))
		.map_err(|source| MalformedEventError::Hex { field, source })
}

/// Index block hash: `sha512/256(block_hash ‖ consensus_hash)`.
fn index_block_hash(block_hash: &H256, consensus_hash: &[u8]) -> Result<H256, MalformedEventError> {
	let consensus_hash = ConsensusHash::from_bytes(consensus_hash).ok_or(MalformedEventError::Decode {
		field: "from_index_consensus_hash",
		source: DecodeError::Length {
			expected: 20,
			actual: consensus_hash.len(),
		},
	})?;
	Ok(H256(StacksBlockId::new(&consensus_hash, &BlockHeaderHash(block_hash.0)).0))
}

fn tx_status(status: &str) -> Result<TxStatus, MalformedEventError> {
	match status {
		"success" => Ok(TxStatus::Success),
		"abort_by_response" => Ok(TxStatus::AbortByResponse),
		"abort_by_post_condition" => Ok(TxStatus::AbortByPostCondition),
		other => Err(MalformedEventError::UnknownTxStatus(other.to_string())),
	}
}

fn parse_tx(
	message: &CoreNodeTxMessage,
	confirmation: Confirmation,
) -> Result<TxUpdate, MalformedEventError> {
	let raw_tx = decode_hex("raw_tx", &message.raw_tx)?;
	let decoded = transaction::decode_transaction(&raw_tx).map_err(|source| {
		MalformedEventError::Decode {
			field: "raw_tx",
			source,
		}
	})?;
	let status = tx_status(&message.status)?;

	let smart_contracts = match &decoded.body.payload {
		TxPayload::SmartContract {
			contract_id,
			clarity_version,
			source_code,
		} if status == TxStatus::Success => vec![Record::new(
			confirmation.clone(),
			SmartContract {
				contract_id: contract_id.clone(),
				clarity_version: *clarity_version,
				source_code: source_code.clone(),
				abi: message.contract_abi.as_ref().map(Value::to_string),
			},
		)],
		_ => vec![],
	};

	let tx = Transaction {
		body: decoded.body,
		status,
		raw_result: message.raw_result.clone(),
		execution_cost: message.execution_cost.unwrap_or_default(),
		event_count: 0,
	};

	let mut update = TxUpdate::new(Record::new(confirmation, tx));
	update.smart_contracts = smart_contracts;
	Ok(update)
}

fn event_body<T: DeserializeOwned>(event: &CoreNodeEvent) -> Result<T, MalformedEventError> {
	let body = event.body.get(&event.kind).cloned().unwrap_or(Value::Null);
	serde_json::from_value(body).map_err(|source| MalformedEventError::EventBody {
		kind: event.kind.clone(),
		source,
	})
}

/// Attaches events to their transactions, renumbering indexes per transaction.
///
/// Upstream indexes are block scoped; each transaction gets a contiguous range
/// starting at 0, in the order of the original indexes.
fn attach_events(
	txs: &mut [TxUpdate],
	events: &[CoreNodeEvent],
	network: Network,
) -> Result<(), MalformedEventError> {
	let positions: HashMap<H256, usize> = txs
		.iter()
		.enumerate()
		.map(|(position, tx)| (tx.tx_id(), position))
		.collect();
	let mut next_index: HashMap<H256, u32> = HashMap::new();

	for event in events.iter().sorted_by_key(|event| event.event_index) {
		if !event.committed {
			debug!(tx_id = %event.txid, event_index = event.event_index, "Skipping uncommitted event");
			continue;
		}
		let Some(&position) = positions.get(&event.txid) else {
			return Err(MalformedEventError::MissingTransaction {
				tx_id: event.txid,
				event_index: event.event_index,
			});
		};

		let counter = next_index.entry(event.txid).or_default();
		let event_index = *counter;
		*counter += 1;

		let tx = &mut txs[position];
		let confirmation = tx.tx.confirmation.clone();
		tx.tx.data.event_count += 1;

		match event.kind.as_str() {
			"stx_transfer_event" => {
				let body: StxTransferEventBody = event_body(event)?;
				tx.stx_events.push(Record::new(
					confirmation,
					StxEvent {
						event_index,
						asset_event_type: AssetEventType::Transfer,
						sender: Some(body.sender),
						recipient: Some(body.recipient),
						amount: body.amount,
						memo: body.memo,
					},
				));
			},
			"stx_mint_event" => {
				let body: StxMintEventBody = event_body(event)?;
				tx.stx_events.push(Record::new(
					confirmation,
					StxEvent {
						event_index,
						asset_event_type: AssetEventType::Mint,
						sender: None,
						recipient: Some(body.recipient),
						amount: body.amount,
						memo: None,
					},
				));
			},
			"stx_burn_event" => {
				let body: StxBurnEventBody = event_body(event)?;
				tx.stx_events.push(Record::new(
					confirmation,
					StxEvent {
						event_index,
						asset_event_type: AssetEventType::Burn,
						sender: Some(body.sender),
						recipient: None,
						amount: body.amount,
						memo: None,
					},
				));
			},
			"stx_lock_event" => {
				let body: StxLockEventBody = event_body(event)?;
				let unlock_height = body.unlock_height.parse::<u64>().map_err(|_| {
					MalformedEventError::InvalidNumber {
						field: "unlock_height",
						value: body.unlock_height.clone(),
					}
				})?;
				let contract_name = body
					.contract_identifier
					.as_deref()
					.and_then(|id| id.split_once('.'))
					.map(|(_, name)| name.to_string())
					.unwrap_or_else(|| "pox".to_string());
				tx.stx_lock_events.push(Record::new(
					confirmation,
					StxLockEvent {
						event_index,
						locked_amount: body.locked_amount,
						unlock_height,
						locked_address: body.locked_address,
						contract_name,
					},
				));
			},
			"ft_transfer_event" | "ft_mint_event" | "ft_burn_event" => {
				let body: FtEventBody = event_body(event)?;
				tx.ft_events.push(Record::new(
					confirmation,
					FtEvent {
						event_index,
						asset_event_type: asset_event_type(&event.kind),
						asset_identifier: body.asset_identifier,
						sender: body.sender,
						recipient: body.recipient,
						amount: body.amount,
					},
				));
			},
			"nft_transfer_event" | "nft_mint_event" | "nft_burn_event" => {
				let body: NftEventBody = event_body(event)?;
				let (_, value) = clarity::decode_repr("nft raw_value", &body.raw_value)?;
				tx.nft_events.push(Record::new(
					confirmation,
					NftEvent {
						event_index,
						asset_event_type: asset_event_type(&event.kind),
						asset_identifier: body.asset_identifier,
						value,
						sender: body.sender,
						recipient: body.recipient,
					},
				));
			},
			"contract_event" => {
				let body: ContractEventBody = event_body(event)?;
				let (decoded, value) = clarity::decode_repr("contract raw_value", &body.raw_value)?;

				let pox_event = pox::pox_contract_name(&body.contract_identifier, network)
					.filter(|_| body.topic == "print")
					.and_then(|contract| pox::decode_pox_event(contract, &decoded, event_index));
				if let Some(pox_event) = pox_event {
					tx.pox_events.push(Record::new(confirmation.clone(), pox_event));
				}

				tx.contract_logs.push(Record::new(
					confirmation,
					ContractLog {
						event_index,
						contract_identifier: body.contract_identifier,
						topic: body.topic,
						value,
					},
				));
			},
			other => return Err(MalformedEventError::UnknownEventType(other.to_string())),
		}
	}
	Ok(())
}

fn asset_event_type(kind: &str) -> AssetEventType {
	if kind.ends_with("_mint_event") {
		AssetEventType::Mint
	} else if kind.ends_with("_burn_event") {
		AssetEventType::Burn
	} else {
		AssetEventType::Transfer
	}
}

/// Microblocks referenced by transactions, one per hash, ordered by sequence.
fn derive_microblocks(txs: &[TxUpdate], template: impl Fn(&Confirmation, H256) -> Microblock) -> Vec<Microblock> {
	txs.iter()
		.filter(|tx| !tx.tx.confirmation.is_anchored())
		.unique_by(|tx| tx.tx.confirmation.microblock_hash)
		.map(|tx| {
			let parent_hash = tx.microblock_parent_hash;
			template(&tx.tx.confirmation, parent_hash)
		})
		.sorted_by_key(|microblock| microblock.microblock_sequence)
		.collect()
}

pub fn parse_block_message(
	message: &CoreNodeBlockMessage,
	network: Network,
) -> Result<BlockUpdate, MalformedEventError> {
	let mut execution_cost = message.anchored_cost.unwrap_or_default();
	execution_cost += message.confirmed_microblocks_cost.unwrap_or_default();

	let block = Block {
		block_hash: message.block_hash,
		index_block_hash: message.index_block_hash,
		parent_index_block_hash: message.parent_index_block_hash,
		parent_block_hash: message.parent_block_hash,
		parent_microblock_hash: message.parent_microblock,
		parent_microblock_sequence: message.parent_microblock_sequence,
		block_height: message.block_height,
		burn_block_hash: message.burn_block_hash,
		burn_block_height: message.burn_block_height,
		burn_block_time: message.burn_block_time,
		miner_txid: message.miner_txid,
		canonical: true,
		execution_cost,
		tx_count: message.transactions.len() as u32,
	};

	let mut txs = message
		.transactions
		.iter()
		.map(|tx| {
			let confirmation = Confirmation {
				tx_id: tx.txid,
				tx_index: tx.tx_index,
				block_height: message.block_height,
				block_hash: message.block_hash,
				index_block_hash: message.index_block_hash,
				parent_index_block_hash: message.parent_index_block_hash,
				burn_block_time: message.burn_block_time,
				microblock_hash: tx.microblock_hash.unwrap_or_default(),
				microblock_sequence: tx
					.microblock_sequence
					.unwrap_or(ANCHORED_MICROBLOCK_SEQUENCE),
				canonical: true,
				microblock_canonical: true,
			};
			let mut update = parse_tx(tx, confirmation)?;
			update.microblock_parent_hash = tx.microblock_parent_hash.unwrap_or_default();
			Ok(update)
		})
		.collect::<Result<Vec<_>, MalformedEventError>>()?;
	attach_events(&mut txs, &message.events, network)?;

	let microblocks = derive_microblocks(&txs, |confirmation, microblock_parent_hash| Microblock {
		microblock_hash: confirmation.microblock_hash,
		microblock_sequence: confirmation.microblock_sequence,
		microblock_parent_hash,
		parent_index_block_hash: message.parent_index_block_hash,
		block_height: message.block_height,
		parent_block_height: message.block_height.saturating_sub(1),
		parent_block_hash: message.parent_block_hash,
		parent_burn_block_height: message.parent_burn_block_height,
		parent_burn_block_hash: message.parent_burn_block_hash,
		parent_burn_block_time: message.parent_burn_block_timestamp,
		index_block_hash: message.index_block_hash,
		block_hash: message.block_hash,
		canonical: true,
		microblock_canonical: true,
	});

	let miner_rewards = message
		.matured_miner_rewards
		.iter()
		.map(|reward| {
			let consensus_hash = decode_hex("from_index_consensus_hash", &reward.from_index_consensus_hash)?;
			Ok(MinerReward {
				block_hash: message.block_hash,
				index_block_hash: message.index_block_hash,
				from_index_block_hash: index_block_hash(&reward.from_stacks_block_hash, &consensus_hash)?,
				mature_block_height: message.block_height,
				canonical: true,
				recipient: reward.recipient.clone(),
				miner_address: reward.miner_address.clone(),
				coinbase_amount: reward.coinbase_amount,
				tx_fees_anchored: reward.tx_fees_anchored,
				tx_fees_streamed_confirmed: reward.tx_fees_streamed_confirmed,
				tx_fees_streamed_produced: reward.tx_fees_streamed_produced,
			})
		})
		.collect::<Result<Vec<_>, MalformedEventError>>()?;

	debug!(
		block_height = block.block_height,
		index_block_hash = %block.index_block_hash,
		txs = txs.len(),
		microblocks = microblocks.len(),
		"Parsed block message"
	);

	Ok(BlockUpdate {
		block,
		microblocks,
		txs,
		miner_rewards,
		pox_state: PoxState {
			pox_v1_unlock_height: message.pox_v1_unlock_height.filter(|height| *height > 0),
			pox_v2_unlock_height: message.pox_v2_unlock_height.filter(|height| *height > 0),
			pox_v3_unlock_height: message.pox_v3_unlock_height.filter(|height| *height > 0),
		},
	})
}

/// Unconfirmed microblocks. Heights and anchor hashes are assigned on ingestion.
pub fn parse_microblocks_message(
	message: &CoreNodeMicroblockMessage,
	network: Network,
) -> Result<MicroblockUpdate, MalformedEventError> {
	let mut txs = message
		.transactions
		.iter()
		.map(|tx| {
			let (Some(microblock_hash), Some(microblock_sequence), Some(microblock_parent_hash)) =
				(tx.microblock_hash, tx.microblock_sequence, tx.microblock_parent_hash)
			else {
				return Err(MalformedEventError::MissingMicroblockFields(tx.txid));
			};
			let confirmation = Confirmation {
				tx_id: tx.txid,
				tx_index: tx.tx_index,
				parent_index_block_hash: message.parent_index_block_hash,
				burn_block_time: message.burn_block_timestamp,
				microblock_hash,
				microblock_sequence,
				canonical: true,
				microblock_canonical: true,
				..Default::default()
			};
			let mut update = parse_tx(tx, confirmation)?;
			update.microblock_parent_hash = microblock_parent_hash;
			Ok(update)
		})
		.collect::<Result<Vec<_>, MalformedEventError>>()?;
	attach_events(&mut txs, &message.events, network)?;

	let microblocks = derive_microblocks(&txs, |confirmation, microblock_parent_hash| Microblock {
		microblock_hash: confirmation.microblock_hash,
		microblock_sequence: confirmation.microblock_sequence,
		microblock_parent_hash,
		parent_index_block_hash: message.parent_index_block_hash,
		parent_burn_block_height: message.burn_block_height,
		parent_burn_block_hash: message.burn_block_hash,
		parent_burn_block_time: message.burn_block_timestamp,
		canonical: true,
		microblock_canonical: true,
		..Default::default()
	});

	Ok(MicroblockUpdate {
		parent_index_block_hash: message.parent_index_block_hash,
		microblocks,
		txs,
	})
}

pub fn parse_burn_block_message(message: &CoreNodeBurnBlockMessage) -> BurnBlockUpdate {
	let rewards = message
		.reward_recipients
		.iter()
		.enumerate()
		.map(|(reward_index, recipient)| BurnchainReward {
			burn_block_hash: message.burn_block_hash,
			burn_block_height: message.burn_block_height,
			burn_amount: message.burn_amount,
			reward_recipient: recipient.recipient.clone(),
			reward_amount: recipient.amt,
			reward_index: reward_index as u32,
			canonical: true,
		})
		.collect();

	let slot_holders = message
		.reward_slot_holders
		.iter()
		.enumerate()
		.map(|(slot_index, address)| RewardSlotHolder {
			burn_block_hash: message.burn_block_hash,
			burn_block_height: message.burn_block_height,
			address: address.clone(),
			slot_index: slot_index as u32,
			canonical: true,
		})
		.collect();

	BurnBlockUpdate {
		burn_block_hash: message.burn_block_hash,
		burn_block_height: message.burn_block_height,
		rewards,
		slot_holders,
	}
}

/// Raw transactions broadcast to the node mempool.
pub fn parse_mempool_txs(
	raw_txs: &[String],
	receipt_time: i64,
) -> Result<Vec<MempoolTx>, MalformedEventError> {
	raw_txs
		.iter()
		.map(|raw_tx| {
			let raw_tx = decode_hex("raw_tx", raw_tx)?;
			let decoded = transaction::decode_transaction(&raw_tx).map_err(|source| {
				MalformedEventError::Decode {
					field: "raw_tx",
					source,
				}
			})?;
			Ok(MempoolTx {
				tx_id: decoded.tx_id,
				body: decoded.body,
				receipt_time,
				receipt_block_height: 0,
				pruned: false,
				status: TxStatus::Pending,
			})
		})
		.collect()
}

pub fn parse_drop_mempool_message(
	message: &CoreNodeDropMempoolTxMessage,
) -> Result<MempoolDrop, MalformedEventError> {
	let reason = DropReason::from_str(&message.reason)
		.map_err(|_| MalformedEventError::UnknownDropReason(message.reason.clone()))?;
	Ok(MempoolDrop {
		tx_ids: message.dropped_txids.clone(),
		status: reason.into(),
	})
}
