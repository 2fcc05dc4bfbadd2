//! Payloads posted by the node's event observer.

use crate::types::{u128_string_format, ExecutionCost, H256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoreNodeBlockMessage {
	pub block_hash: H256,
	pub block_height: u64,
	pub burn_block_time: i64,
	pub burn_block_hash: H256,
	pub burn_block_height: u64,
	pub miner_txid: H256,
	pub index_block_hash: H256,
	pub parent_index_block_hash: H256,
	pub parent_block_hash: H256,
	pub parent_microblock: H256,
	pub parent_microblock_sequence: i32,
	pub parent_burn_block_hash: H256,
	pub parent_burn_block_height: u64,
	pub parent_burn_block_timestamp: i64,
	#[serde(default)]
	pub events: Vec<CoreNodeEvent>,
	#[serde(default)]
	pub transactions: Vec<CoreNodeTxMessage>,
	#[serde(default)]
	pub matured_miner_rewards: Vec<CoreNodeMinerReward>,
	#[serde(default)]
	pub anchored_cost: Option<ExecutionCost>,
	#[serde(default)]
	pub confirmed_microblocks_cost: Option<ExecutionCost>,
	#[serde(default)]
	pub pox_v1_unlock_height: Option<u64>,
	#[serde(default)]
	pub pox_v2_unlock_height: Option<u64>,
	#[serde(default)]
	pub pox_v3_unlock_height: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoreNodeTxMessage {
	pub txid: H256,
	pub tx_index: u32,
	pub raw_tx: String,
	pub status: String,
	#[serde(default)]
	pub raw_result: String,
	#[serde(default)]
	pub contract_abi: Option<Value>,
	#[serde(default)]
	pub execution_cost: Option<ExecutionCost>,
	#[serde(default)]
	pub microblock_hash: Option<H256>,
	#[serde(default)]
	pub microblock_sequence: Option<i32>,
	#[serde(default)]
	pub microblock_parent_hash: Option<H256>,
}

/// Event envelope; the body sits under a key named after `type`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoreNodeEvent {
	pub txid: H256,
	pub event_index: u32,
	#[serde(default = "committed_default")]
	pub committed: bool,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(flatten)]
	pub body: Map<String, Value>,
}

fn committed_default() -> bool {
	true
}

#[derive(Clone, Debug, Deserialize)]
pub struct StxTransferEventBody {
	pub sender: String,
	pub recipient: String,
	#[serde(with = "u128_string_format")]
	pub amount: u128,
	#[serde(default)]
	pub memo: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StxMintEventBody {
	pub recipient: String,
	#[serde(with = "u128_string_format")]
	pub amount: u128,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StxBurnEventBody {
	pub sender: String,
	#[serde(with = "u128_string_format")]
	pub amount: u128,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StxLockEventBody {
	#[serde(with = "u128_string_format")]
	pub locked_amount: u128,
	pub unlock_height: String,
	pub locked_address: String,
	#[serde(default)]
	pub contract_identifier: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FtEventBody {
	pub asset_identifier: String,
	#[serde(default)]
	pub sender: Option<String>,
	#[serde(default)]
	pub recipient: Option<String>,
	#[serde(with = "u128_string_format")]
	pub amount: u128,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NftEventBody {
	pub asset_identifier: String,
	#[serde(default)]
	pub sender: Option<String>,
	#[serde(default)]
	pub recipient: Option<String>,
	pub raw_value: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ContractEventBody {
	pub contract_identifier: String,
	pub topic: String,
	pub raw_value: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoreNodeMinerReward {
	pub from_index_consensus_hash: String,
	pub from_stacks_block_hash: H256,
	pub recipient: String,
	#[serde(default)]
	pub miner_address: Option<String>,
	#[serde(with = "u128_string_format")]
	pub coinbase_amount: u128,
	#[serde(with = "u128_string_format")]
	pub tx_fees_anchored: u128,
	#[serde(with = "u128_string_format")]
	pub tx_fees_streamed_confirmed: u128,
	#[serde(with = "u128_string_format")]
	pub tx_fees_streamed_produced: u128,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoreNodeMicroblockMessage {
	pub parent_index_block_hash: H256,
	pub burn_block_hash: H256,
	pub burn_block_height: u64,
	pub burn_block_timestamp: i64,
	#[serde(default)]
	pub events: Vec<CoreNodeEvent>,
	#[serde(default)]
	pub transactions: Vec<CoreNodeTxMessage>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoreNodeBurnBlockMessage {
	pub burn_block_hash: H256,
	pub burn_block_height: u64,
	#[serde(with = "u128_string_format")]
	pub burn_amount: u128,
	#[serde(default)]
	pub reward_recipients: Vec<CoreNodeRewardRecipient>,
	#[serde(default)]
	pub reward_slot_holders: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoreNodeRewardRecipient {
	pub recipient: String,
	#[serde(with = "u128_string_format")]
	pub amt: u128,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoreNodeDropMempoolTxMessage {
	pub dropped_txids: Vec<H256>,
	pub reason: String,
}
