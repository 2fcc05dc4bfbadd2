//! Indexed chain state.
//!
//! Reads go through [`ChainStore`]. Every mutation happens on a [`StoreWriter`],
//! which holds the store exclusively and undoes its writes unless committed.
//! A store opened over a [`Backend`] writes each commit through to it as one
//! atomic batch, and loads everything back on open.

use crate::{
	error::StoreError,
	types::{
		Block, BurnchainReward, ChainTip, Confirmation, ContractLog, FtEvent, MempoolTx,
		Microblock, MinerReward, NftCustody, NftEvent, NftKey, PoxEvent, PoxState, Record,
		RewardSlotHolder, SmartContract, StxEvent, StxLockEvent, TxRecord, H256,
	},
};
use serde::{de::DeserializeOwned, Serialize};
use strum::{EnumIter, IntoStaticStr};

mod mem_store;
pub use mem_store::*;

#[cfg(feature = "rocksdb")]
mod rocks_db;
#[cfg(feature = "rocksdb")]
pub use rocks_db::RocksDB;

/// Column family of persisted rows.
///
/// Table rows are keyed by their big-endian table position, so iterating a
/// column in key order yields rows in insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Column {
	/// Chain tip and PoX state singletons.
	State,
	Blocks,
	Microblocks,
	Txs,
	StxEvents,
	StxLockEvents,
	FtEvents,
	NftEvents,
	ContractLogs,
	SmartContracts,
	PoxEvents,
	MinerRewards,
	BurnchainRewards,
	RewardSlotHolders,
	Mempool,
}

impl Column {
	pub fn name(&self) -> &'static str {
		self.into()
	}
}

pub const TIP_KEY: &[u8] = b"chain_tip";
pub const POX_STATE_KEY: &[u8] = b"pox_state";

pub fn position_key(position: usize) -> Vec<u8> {
	(position as u64).to_be_bytes().to_vec()
}

/// Single key write of a commit batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
	pub column: Column,
	pub key: Vec<u8>,
	pub value: Vec<u8>,
}

/// Durable storage the in-memory tables are written through to.
pub trait Backend: Send + Sync {
	/// Writes all entries, or none of them.
	fn write(&self, entries: Vec<Entry>) -> Result<(), StoreError>;

	/// Key and value pairs of a column, in key order.
	fn load(&self, column: Column) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

/// Row of a [`Table`], addressed by a hash that does not change after insert.
pub trait Row: Clone + PartialEq + Serialize + DeserializeOwned + 'static {
	fn key(&self) -> H256;
}

impl Row for Block {
	fn key(&self) -> H256 {
		self.index_block_hash
	}
}

impl Row for Microblock {
	fn key(&self) -> H256 {
		self.microblock_hash
	}
}

impl<T: Clone + PartialEq + Serialize + DeserializeOwned + 'static> Row for Record<T> {
	fn key(&self) -> H256 {
		self.confirmation.tx_id
	}
}

impl Row for MempoolTx {
	fn key(&self) -> H256 {
		self.tx_id
	}
}

impl Row for MinerReward {
	fn key(&self) -> H256 {
		self.index_block_hash
	}
}

impl Row for BurnchainReward {
	fn key(&self) -> H256 {
		self.burn_block_hash
	}
}

impl Row for RewardSlotHolder {
	fn key(&self) -> H256 {
		self.burn_block_hash
	}
}

/// Rows hanging off transactions with a given id, across all of its confirmations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxEvents {
	pub stx_events: Vec<Record<StxEvent>>,
	pub stx_lock_events: Vec<Record<StxLockEvent>>,
	pub ft_events: Vec<Record<FtEvent>>,
	pub nft_events: Vec<Record<NftEvent>>,
	pub contract_logs: Vec<Record<ContractLog>>,
	pub smart_contracts: Vec<Record<SmartContract>>,
	pub pox_events: Vec<Record<PoxEvent>>,
}

impl TxEvents {
	pub fn confirmations(&self) -> impl Iterator<Item = &Confirmation> {
		(self.stx_events.iter().map(|e| &e.confirmation))
			.chain(self.stx_lock_events.iter().map(|e| &e.confirmation))
			.chain(self.ft_events.iter().map(|e| &e.confirmation))
			.chain(self.nft_events.iter().map(|e| &e.confirmation))
			.chain(self.contract_logs.iter().map(|e| &e.confirmation))
			.chain(self.smart_contracts.iter().map(|e| &e.confirmation))
			.chain(self.pox_events.iter().map(|e| &e.confirmation))
	}

	pub fn len(&self) -> usize {
		self.confirmations().count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Read access to indexed chain state.
pub trait ChainStore {
	fn chain_tip(&self) -> ChainTip;

	fn pox_state(&self) -> PoxState;

	fn block(&self, index_block_hash: &H256) -> Option<Block>;

	fn blocks_at_height(&self, block_height: u64) -> Vec<Block>;

	fn canonical_block_at_height(&self, block_height: u64) -> Option<Block> {
		self.blocks_at_height(block_height)
			.into_iter()
			.find(|block| block.canonical)
	}

	fn microblock(&self, microblock_hash: &H256) -> Option<Microblock>;

	fn microblocks_by_parent(&self, parent_index_block_hash: &H256) -> Vec<Microblock>;

	fn microblocks_at_height(&self, block_height: u64) -> Vec<Microblock>;

	/// All rows of a transaction, one per block or microblock that included it.
	fn txs(&self, tx_id: &H256) -> Vec<TxRecord>;

	/// Row of a transaction on the canonical chain, preferring anchored confirmation.
	fn canonical_tx(&self, tx_id: &H256) -> Option<TxRecord> {
		let rows = self.txs(tx_id);
		rows.iter()
			.find(|row| row.confirmation.is_confirmed())
			.or_else(|| rows.iter().find(|row| row.confirmation.is_visible()))
			.cloned()
	}

	fn txs_confirmed_by(&self, index_block_hash: &H256) -> Vec<TxRecord>;

	fn txs_in_microblock(&self, microblock_hash: &H256) -> Vec<TxRecord>;

	fn tx_events(&self, tx_id: &H256) -> TxEvents;

	fn mempool_tx(&self, tx_id: &H256) -> Option<MempoolTx>;

	/// Every mempool row, pruned ones included.
	fn mempool_txs(&self) -> Vec<MempoolTx>;

	fn pending_mempool_txs(&self) -> Vec<MempoolTx> {
		self.mempool_txs()
			.into_iter()
			.filter(|tx| !tx.pruned)
			.collect()
	}

	fn smart_contract(&self, contract_id: &str) -> Vec<Record<SmartContract>>;

	fn miner_rewards(&self, index_block_hash: &H256) -> Vec<MinerReward>;

	fn burnchain_rewards(&self, burn_block_hash: &H256) -> Vec<BurnchainReward>;

	fn reward_slot_holders(&self, burn_block_hash: &H256) -> Vec<RewardSlotHolder>;

	/// Latest owner of an NFT; `unanchored` also reflects unconfirmed microblocks.
	fn nft_custody(&self, key: &NftKey, unanchored: bool) -> Option<NftCustody>;
}
