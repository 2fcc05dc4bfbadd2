//! Domain model shared by the normalizer, the store and the chain engine.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{
	fmt,
	ops::AddAssign,
	str::FromStr,
	time::Duration,
};
use strum::{Display, EnumString};

/// Microblock sequence recorded for transactions anchored directly in a block.
/// Sorts after every streamed transaction of the same block.
pub const ANCHORED_MICROBLOCK_SEQUENCE: i32 = i32::MAX;

/// 32 bytes hash, rendered as `0x` prefixed hex. All zeroes means "unset".
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct H256(pub [u8; 32]);

impl H256 {
	pub const fn zero() -> Self {
		H256([0u8; 32])
	}

	pub fn is_zero(&self) -> bool {
		self.0.iter().all(|byte| *byte == 0)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl From<[u8; 32]> for H256 {
	fn from(value: [u8; 32]) -> Self {
		H256(value)
	}
}

impl FromStr for H256 {
	type Err = hex::FromHexError;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		let value = value.strip_prefix("0x").unwrap_or(value);
		let mut bytes = [0u8; 32];
		hex::decode_to_slice(value, &mut bytes)?;
		Ok(H256(bytes))
	}
}

impl fmt::Display for H256 {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl fmt::Debug for H256 {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

impl Serialize for H256 {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for H256 {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let value = String::deserialize(deserializer)?;
		H256::from_str(&value).map_err(de::Error::custom)
	}
}

#[derive(
	Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Network {
	#[default]
	Mainnet,
	Testnet,
}

impl Network {
	/// Address of the boot contracts (`pox-2`, `pox-3`, `pox-4`, ...)
	pub fn boot_address(&self) -> &'static str {
		match self {
			Network::Mainnet => "SP000000000000000000002Q6VF78",
			Network::Testnet => "ST000000000000000000002AMW42H",
		}
	}
}

/// Transaction status with its persisted integer code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(i16)]
pub enum TxStatus {
	#[default]
	Pending = 0,
	Success = 1,
	AbortByResponse = -1,
	AbortByPostCondition = -2,
	DroppedReplaceByFee = -10,
	DroppedReplaceAcrossFork = -11,
	DroppedTooExpensive = -12,
	DroppedStaleGarbageCollect = -13,
	DroppedApiGarbageCollect = -14,
	DroppedProblematic = -15,
}

impl TxStatus {
	pub fn code(&self) -> i16 {
		*self as i16
	}
}

/// Reason reported by the node when it evicts transactions from its mempool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, Display)]
pub enum DropReason {
	ReplaceByFee,
	ReplaceAcrossFork,
	TooExpensive,
	StaleGarbageCollect,
	Problematic,
}

impl From<DropReason> for TxStatus {
	fn from(reason: DropReason) -> Self {
		match reason {
			DropReason::ReplaceByFee => TxStatus::DroppedReplaceByFee,
			DropReason::ReplaceAcrossFork => TxStatus::DroppedReplaceAcrossFork,
			DropReason::TooExpensive => TxStatus::DroppedTooExpensive,
			DropReason::StaleGarbageCollect => TxStatus::DroppedStaleGarbageCollect,
			DropReason::Problematic => TxStatus::DroppedProblematic,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TxType {
	TokenTransfer,
	SmartContract,
	ContractCall,
	PoisonMicroblock,
	Coinbase,
	TenureChange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
	OnChainOnly,
	OffChainOnly,
	Any,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostConditionMode {
	Allow,
	Deny,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FungibleConditionCode {
	SentEq,
	SentGt,
	SentGe,
	SentLt,
	SentLe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonFungibleConditionCode {
	Sent,
	NotSent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PostConditionPrincipal {
	Origin,
	Standard { address: String },
	Contract { address: String, contract_name: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
	pub contract_address: String,
	pub contract_name: String,
	pub asset_name: String,
}

impl fmt::Display for AssetInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}.{}::{}",
			self.contract_address, self.contract_name, self.asset_name
		)
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PostCondition {
	Stx {
		principal: PostConditionPrincipal,
		condition_code: FungibleConditionCode,
		#[serde(with = "u128_string_format")]
		amount: u128,
	},
	Fungible {
		principal: PostConditionPrincipal,
		asset: AssetInfo,
		condition_code: FungibleConditionCode,
		#[serde(with = "u128_string_format")]
		amount: u128,
	},
	NonFungible {
		principal: PostConditionPrincipal,
		asset: AssetInfo,
		asset_value: ClarityRepr,
		condition_code: NonFungibleConditionCode,
	},
}

/// Serialized Clarity value together with its textual representation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarityRepr {
	pub hex: String,
	pub repr: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TxPayload {
	TokenTransfer {
		recipient: String,
		#[serde(with = "u128_string_format")]
		amount: u128,
		memo: String,
	},
	SmartContract {
		contract_id: String,
		clarity_version: Option<u8>,
		source_code: String,
	},
	ContractCall {
		contract_id: String,
		function_name: String,
		function_args: Vec<ClarityRepr>,
	},
	PoisonMicroblock {
		microblock_header_1: String,
		microblock_header_2: String,
	},
	Coinbase {
		payload: String,
		alt_recipient: Option<String>,
		vrf_proof: Option<String>,
	},
	TenureChange {
		tenure_consensus_hash: String,
		prev_tenure_consensus_hash: String,
		burn_view_consensus_hash: String,
		previous_tenure_end: H256,
		previous_tenure_blocks: u32,
		cause: u8,
		pubkey_hash: String,
	},
}

impl TxPayload {
	pub fn tx_type(&self) -> TxType {
		match self {
			TxPayload::TokenTransfer { .. } => TxType::TokenTransfer,
			TxPayload::SmartContract { .. } => TxType::SmartContract,
			TxPayload::ContractCall { .. } => TxType::ContractCall,
			TxPayload::PoisonMicroblock { .. } => TxType::PoisonMicroblock,
			TxPayload::Coinbase { .. } => TxType::Coinbase,
			TxPayload::TenureChange { .. } => TxType::TenureChange,
		}
	}
}

/// Fields decoded from the raw transaction, shared by confirmed and mempool rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
	#[serde(with = "hex_bytes_format")]
	pub raw_tx: Vec<u8>,
	pub tx_type: TxType,
	pub sender_address: String,
	pub sponsor_address: Option<String>,
	pub nonce: u64,
	pub fee_rate: u64,
	pub anchor_mode: AnchorMode,
	pub post_condition_mode: PostConditionMode,
	pub post_conditions: Vec<PostCondition>,
	pub payload: TxPayload,
}

impl TxBody {
	pub fn sponsored(&self) -> bool {
		self.sponsor_address.is_some()
	}

	pub fn byte_size(&self) -> usize {
		self.raw_tx.len()
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionCost {
	pub read_count: u64,
	pub read_length: u64,
	pub runtime: u64,
	pub write_count: u64,
	pub write_length: u64,
}

impl AddAssign for ExecutionCost {
	fn add_assign(&mut self, other: Self) {
		self.read_count += other.read_count;
		self.read_length += other.read_length;
		self.runtime += other.runtime;
		self.write_count += other.write_count;
		self.write_length += other.write_length;
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
	pub block_hash: H256,
	pub index_block_hash: H256,
	pub parent_index_block_hash: H256,
	pub parent_block_hash: H256,
	pub parent_microblock_hash: H256,
	pub parent_microblock_sequence: i32,
	pub block_height: u64,
	pub burn_block_hash: H256,
	pub burn_block_height: u64,
	pub burn_block_time: i64,
	pub miner_txid: H256,
	pub canonical: bool,
	pub execution_cost: ExecutionCost,
	pub tx_count: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Microblock {
	pub microblock_hash: H256,
	pub microblock_sequence: i32,
	pub microblock_parent_hash: H256,
	pub parent_index_block_hash: H256,
	pub block_height: u64,
	pub parent_block_height: u64,
	pub parent_block_hash: H256,
	pub parent_burn_block_height: u64,
	pub parent_burn_block_hash: H256,
	pub parent_burn_block_time: i64,
	/// Anchor block confirming this microblock, zero while unconfirmed.
	pub index_block_hash: H256,
	pub block_hash: H256,
	pub canonical: bool,
	pub microblock_canonical: bool,
}

/// Position of a transaction (or anything hanging off one) in the chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
	pub tx_id: H256,
	pub tx_index: u32,
	pub block_height: u64,
	pub block_hash: H256,
	pub index_block_hash: H256,
	pub parent_index_block_hash: H256,
	pub burn_block_time: i64,
	pub microblock_hash: H256,
	pub microblock_sequence: i32,
	pub canonical: bool,
	pub microblock_canonical: bool,
}

impl Confirmation {
	/// Confirmed by a canonical anchor block and not orphaned by a microblock fork.
	pub fn is_confirmed(&self) -> bool {
		self.is_visible() && !self.index_block_hash.is_zero()
	}

	/// Part of the canonical chain, counting unconfirmed microblocks.
	pub fn is_visible(&self) -> bool {
		self.canonical && self.microblock_canonical
	}

	pub fn is_anchored(&self) -> bool {
		self.microblock_hash.is_zero()
	}

	/// Ordering key used to pick the latest event, e.g. for NFT custody.
	pub fn position(&self) -> (u64, i32, u32) {
		(self.block_height, self.microblock_sequence, self.tx_index)
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record<T> {
	#[serde(flatten)]
	pub confirmation: Confirmation,
	#[serde(flatten)]
	pub data: T,
}

impl<T> Record<T> {
	pub fn new(confirmation: Confirmation, data: T) -> Self {
		Record { confirmation, data }
	}

	pub fn tx_id(&self) -> H256 {
		self.confirmation.tx_id
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	#[serde(flatten)]
	pub body: TxBody,
	pub status: TxStatus,
	pub raw_result: String,
	pub execution_cost: ExecutionCost,
	pub event_count: u32,
}

pub type TxRecord = Record<Transaction>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetEventType {
	Transfer,
	Mint,
	Burn,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StxEvent {
	pub event_index: u32,
	pub asset_event_type: AssetEventType,
	pub sender: Option<String>,
	pub recipient: Option<String>,
	#[serde(with = "u128_string_format")]
	pub amount: u128,
	pub memo: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StxLockEvent {
	pub event_index: u32,
	#[serde(with = "u128_string_format")]
	pub locked_amount: u128,
	pub unlock_height: u64,
	pub locked_address: String,
	pub contract_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtEvent {
	pub event_index: u32,
	pub asset_event_type: AssetEventType,
	pub asset_identifier: String,
	pub sender: Option<String>,
	pub recipient: Option<String>,
	#[serde(with = "u128_string_format")]
	pub amount: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftEvent {
	pub event_index: u32,
	pub asset_event_type: AssetEventType,
	pub asset_identifier: String,
	pub value: ClarityRepr,
	pub sender: Option<String>,
	pub recipient: Option<String>,
}

impl NftEvent {
	pub fn custody_key(&self) -> NftKey {
		NftKey {
			asset_identifier: self.asset_identifier.clone(),
			value: self.value.hex.clone(),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractLog {
	pub event_index: u32,
	pub contract_identifier: String,
	pub topic: String,
	pub value: ClarityRepr,
}

/// Stacking state change decoded from a `print` of a boot PoX contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoxEvent {
	pub event_index: u32,
	pub pox_contract: String,
	pub name: String,
	pub stacker: String,
	#[serde(with = "u128_string_format")]
	pub balance: u128,
	#[serde(with = "u128_string_format")]
	pub locked: u128,
	pub burnchain_unlock_height: u64,
	pub data: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartContract {
	pub contract_id: String,
	pub clarity_version: Option<u8>,
	pub source_code: String,
	pub abi: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerReward {
	pub block_hash: H256,
	pub index_block_hash: H256,
	pub from_index_block_hash: H256,
	pub mature_block_height: u64,
	pub canonical: bool,
	pub recipient: String,
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

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnchainReward {
	pub burn_block_hash: H256,
	pub burn_block_height: u64,
	#[serde(with = "u128_string_format")]
	pub burn_amount: u128,
	pub reward_recipient: String,
	#[serde(with = "u128_string_format")]
	pub reward_amount: u128,
	pub reward_index: u32,
	pub canonical: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSlotHolder {
	pub burn_block_hash: H256,
	pub burn_block_height: u64,
	pub address: String,
	pub slot_index: u32,
	pub canonical: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoxState {
	pub pox_v1_unlock_height: Option<u64>,
	pub pox_v2_unlock_height: Option<u64>,
	pub pox_v3_unlock_height: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolTx {
	pub tx_id: H256,
	#[serde(flatten)]
	pub body: TxBody,
	pub receipt_time: i64,
	pub receipt_block_height: u64,
	pub pruned: bool,
	pub status: TxStatus,
}

/// Denormalized view of the canonical chain head.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
	pub block_height: u64,
	pub index_block_hash: H256,
	pub block_hash: H256,
	pub burn_block_height: u64,
	pub microblock_hash: Option<H256>,
	pub microblock_sequence: Option<i32>,
	pub microblock_count: u32,
	pub tx_count: u64,
	pub tx_count_unanchored: u64,
	pub mempool_tx_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NftKey {
	pub asset_identifier: String,
	pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftCustody {
	pub asset_identifier: String,
	pub value: ClarityRepr,
	pub recipient: Option<String>,
	pub tx_id: H256,
	pub block_height: u64,
	pub index_block_hash: H256,
	pub microblock_sequence: i32,
	pub tx_index: u32,
	pub event_index: u32,
}

/// One transaction with everything it produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxUpdate {
	pub tx: TxRecord,
	/// Parent of the microblock carrying the transaction, zero when anchored.
	pub microblock_parent_hash: H256,
	pub stx_events: Vec<Record<StxEvent>>,
	pub stx_lock_events: Vec<Record<StxLockEvent>>,
	pub ft_events: Vec<Record<FtEvent>>,
	pub nft_events: Vec<Record<NftEvent>>,
	pub contract_logs: Vec<Record<ContractLog>>,
	pub smart_contracts: Vec<Record<SmartContract>>,
	pub pox_events: Vec<Record<PoxEvent>>,
}

impl TxUpdate {
	pub fn new(tx: TxRecord) -> Self {
		TxUpdate {
			tx,
			microblock_parent_hash: H256::zero(),
			stx_events: vec![],
			stx_lock_events: vec![],
			ft_events: vec![],
			nft_events: vec![],
			contract_logs: vec![],
			smart_contracts: vec![],
			pox_events: vec![],
		}
	}

	pub fn tx_id(&self) -> H256 {
		self.tx.confirmation.tx_id
	}

	/// Clears contract logs and token events, which are not kept during initial block download.
	pub fn drop_prunable_events(&mut self) {
		self.contract_logs.clear();
		self.ft_events.clear();
		self.nft_events.clear();
	}

	/// Applies `f` to the confirmation of the transaction and of every dependent row.
	pub fn for_each_confirmation(&mut self, mut f: impl FnMut(&mut Confirmation)) {
		f(&mut self.tx.confirmation);
		self.stx_events.iter_mut().for_each(|e| f(&mut e.confirmation));
		self.stx_lock_events.iter_mut().for_each(|e| f(&mut e.confirmation));
		self.ft_events.iter_mut().for_each(|e| f(&mut e.confirmation));
		self.nft_events.iter_mut().for_each(|e| f(&mut e.confirmation));
		self.contract_logs.iter_mut().for_each(|e| f(&mut e.confirmation));
		self.smart_contracts.iter_mut().for_each(|e| f(&mut e.confirmation));
		self.pox_events.iter_mut().for_each(|e| f(&mut e.confirmation));
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockUpdate {
	pub block: Block,
	pub microblocks: Vec<Microblock>,
	pub txs: Vec<TxUpdate>,
	pub miner_rewards: Vec<MinerReward>,
	pub pox_state: PoxState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MicroblockUpdate {
	pub parent_index_block_hash: H256,
	/// Ordered by sequence.
	pub microblocks: Vec<Microblock>,
	pub txs: Vec<TxUpdate>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BurnBlockUpdate {
	pub burn_block_hash: H256,
	pub burn_block_height: u64,
	pub rewards: Vec<BurnchainReward>,
	pub slot_holders: Vec<RewardSlotHolder>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MempoolDrop {
	pub tx_ids: Vec<H256>,
	pub status: TxStatus,
}

pub mod tracing_level_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::str::FromStr;
	use tracing::Level;

	pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&level.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		Level::from_str(&value).map_err(serde::de::Error::custom)
	}
}

pub mod duration_millis_format {
	use super::Duration;
	use serde::{self, Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_millis() as u64)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = u64::deserialize(deserializer)?;
		Ok(Duration::from_millis(value))
	}
}

/// Amounts exceed `u64` and are carried as decimal strings.
pub mod u128_string_format {
	use serde::{self, Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.collect_str(value)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		value.parse::<u128>().map_err(serde::de::Error::custom)
	}
}

pub mod hex_bytes_format {
	use serde::{self, Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&format!("0x{}", hex::encode(value)))
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		let value = value.strip_prefix("0x").unwrap_or(&value);
		hex::decode(value).map_err(serde::de::Error::custom)
	}
}
