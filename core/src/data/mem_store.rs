use super::{
	position_key, Backend, ChainStore, Column, Entry, Row, TxEvents, POX_STATE_KEY, TIP_KEY,
};
use crate::{
	error::StoreError,
	types::{
		Block, BurnchainReward, ChainTip, Confirmation, ContractLog, FtEvent, MempoolTx,
		Microblock, MinerReward, NftCustody, NftEvent, NftKey, PoxEvent, PoxState, Record,
		RewardSlotHolder, SmartContract, StxEvent, StxLockEvent, TxRecord, TxUpdate, H256,
	},
};
use itertools::Itertools;
use serde::{de::DeserializeOwned, Serialize};
use std::{
	borrow::Borrow,
	collections::{BTreeMap, HashMap, HashSet},
	hash::Hash,
	ops::Deref,
	sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::{debug, info, trace};

fn encode<T: Serialize>(column: Column, value: &T) -> Result<Vec<u8>, StoreError> {
	serde_json::to_vec(value).map_err(|source| StoreError::Codec {
		column: column.name(),
		source,
	})
}

fn decode<T: DeserializeOwned>(column: Column, value: &[u8]) -> Result<T, StoreError> {
	serde_json::from_slice(value).map_err(|source| StoreError::Codec {
		column: column.name(),
		source,
	})
}

/// Rows in insertion order, with positions grouped by row key.
pub struct Table<T> {
	column: Column,
	rows: Vec<T>,
	by_key: HashMap<H256, Vec<usize>>,
}

impl<T: Row> Table<T> {
	fn new(column: Column) -> Self {
		Table {
			column,
			rows: vec![],
			by_key: HashMap::new(),
		}
	}

	fn load(&mut self, backend: &dyn Backend) -> Result<(), StoreError> {
		for (_, value) in backend.load(self.column)? {
			self.push(decode(self.column, &value)?);
		}
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &T> {
		self.rows.iter()
	}

	pub fn get<'a>(&'a self, key: &H256) -> impl Iterator<Item = &'a T> + 'a {
		self.by_key
			.get(key)
			.into_iter()
			.flatten()
			.map(move |position| &self.rows[*position])
	}

	fn positions(&self, key: &H256) -> Vec<usize> {
		self.by_key.get(key).cloned().unwrap_or_default()
	}

	fn push(&mut self, row: T) {
		self.by_key
			.entry(row.key())
			.or_default()
			.push(self.rows.len());
		self.rows.push(row);
	}

	/// Removes the most recently pushed row.
	fn pop(&mut self) {
		let Some(row) = self.rows.pop() else {
			return;
		};
		let key = row.key();
		if let Some(positions) = self.by_key.get_mut(&key) {
			positions.pop();
			if positions.is_empty() {
				self.by_key.remove(&key);
			}
		}
	}
}

/// Lookup hints for secondary access paths.
///
/// Hints are never undone, so they may point at rows a rolled back writer
/// removed or moved. Reads always re-check the rows they resolve to.
#[derive(Default)]
struct Indexes {
	blocks_by_height: HashMap<u64, Vec<H256>>,
	microblocks_by_parent: HashMap<H256, Vec<H256>>,
	microblocks_by_height: HashMap<u64, Vec<H256>>,
	txs_by_block: HashMap<H256, Vec<H256>>,
	txs_by_microblock: HashMap<H256, Vec<H256>>,
	nfts_by_key: HashMap<NftKey, Vec<H256>>,
	contracts_by_id: HashMap<String, Vec<H256>>,
}

impl Indexes {
	fn hint_block(&mut self, block: &Block) {
		hint(&mut self.blocks_by_height, block.block_height, block.index_block_hash);
	}

	fn hint_microblock(&mut self, microblock: &Microblock) {
		hint(
			&mut self.microblocks_by_parent,
			microblock.parent_index_block_hash,
			microblock.microblock_hash,
		);
		hint(
			&mut self.microblocks_by_height,
			microblock.block_height,
			microblock.microblock_hash,
		);
	}

	fn hint_tx(&mut self, confirmation: &Confirmation) {
		if !confirmation.index_block_hash.is_zero() {
			hint(&mut self.txs_by_block, confirmation.index_block_hash, confirmation.tx_id);
		}
		if !confirmation.microblock_hash.is_zero() {
			hint(
				&mut self.txs_by_microblock,
				confirmation.microblock_hash,
				confirmation.tx_id,
			);
		}
	}
}

fn hint<K: Eq + Hash>(index: &mut HashMap<K, Vec<H256>>, key: K, value: H256) {
	let values = index.entry(key).or_default();
	if !values.contains(&value) {
		values.push(value);
	}
}

fn hinted<'a, K, Q>(index: &'a HashMap<K, Vec<H256>>, key: &Q) -> &'a [H256]
where
	K: Borrow<Q> + Eq + Hash,
	Q: Eq + Hash + ?Sized,
{
	index.get(key).map(Vec::as_slice).unwrap_or_default()
}

pub struct Tables {
	tip: ChainTip,
	pox_state: PoxState,
	blocks: Table<Block>,
	microblocks: Table<Microblock>,
	txs: Table<TxRecord>,
	stx_events: Table<Record<StxEvent>>,
	stx_lock_events: Table<Record<StxLockEvent>>,
	ft_events: Table<Record<FtEvent>>,
	nft_events: Table<Record<NftEvent>>,
	contract_logs: Table<Record<ContractLog>>,
	smart_contracts: Table<Record<SmartContract>>,
	pox_events: Table<Record<PoxEvent>>,
	miner_rewards: Table<MinerReward>,
	burnchain_rewards: Table<BurnchainReward>,
	reward_slot_holders: Table<RewardSlotHolder>,
	mempool: Table<MempoolTx>,
	nft_custody: HashMap<NftKey, NftCustody>,
	nft_custody_unanchored: HashMap<NftKey, NftCustody>,
	indexes: Indexes,
}

impl Default for Tables {
	fn default() -> Self {
		Tables {
			tip: ChainTip::default(),
			pox_state: PoxState::default(),
			blocks: Table::new(Column::Blocks),
			microblocks: Table::new(Column::Microblocks),
			txs: Table::new(Column::Txs),
			stx_events: Table::new(Column::StxEvents),
			stx_lock_events: Table::new(Column::StxLockEvents),
			ft_events: Table::new(Column::FtEvents),
			nft_events: Table::new(Column::NftEvents),
			contract_logs: Table::new(Column::ContractLogs),
			smart_contracts: Table::new(Column::SmartContracts),
			pox_events: Table::new(Column::PoxEvents),
			miner_rewards: Table::new(Column::MinerRewards),
			burnchain_rewards: Table::new(Column::BurnchainRewards),
			reward_slot_holders: Table::new(Column::RewardSlotHolders),
			mempool: Table::new(Column::Mempool),
			nft_custody: HashMap::new(),
			nft_custody_unanchored: HashMap::new(),
			indexes: Indexes::default(),
		}
	}
}

/// Table accessors, usable as `fn` pointers inside undo entries.
mod select {
	use super::{Table, Tables};
	use crate::types::{
		Block, BurnchainReward, ContractLog, FtEvent, MempoolTx, Microblock, MinerReward,
		NftEvent, PoxEvent, Record, RewardSlotHolder, SmartContract, StxEvent, StxLockEvent,
		TxRecord,
	};

	pub type TableFn<T> = fn(&mut Tables) -> &mut Table<T>;

	pub fn blocks(tables: &mut Tables) -> &mut Table<Block> {
		&mut tables.blocks
	}

	pub fn microblocks(tables: &mut Tables) -> &mut Table<Microblock> {
		&mut tables.microblocks
	}

	pub fn txs(tables: &mut Tables) -> &mut Table<TxRecord> {
		&mut tables.txs
	}

	pub fn stx_events(tables: &mut Tables) -> &mut Table<Record<StxEvent>> {
		&mut tables.stx_events
	}

	pub fn stx_lock_events(tables: &mut Tables) -> &mut Table<Record<StxLockEvent>> {
		&mut tables.stx_lock_events
	}

	pub fn ft_events(tables: &mut Tables) -> &mut Table<Record<FtEvent>> {
		&mut tables.ft_events
	}

	pub fn nft_events(tables: &mut Tables) -> &mut Table<Record<NftEvent>> {
		&mut tables.nft_events
	}

	pub fn contract_logs(tables: &mut Tables) -> &mut Table<Record<ContractLog>> {
		&mut tables.contract_logs
	}

	pub fn smart_contracts(tables: &mut Tables) -> &mut Table<Record<SmartContract>> {
		&mut tables.smart_contracts
	}

	pub fn pox_events(tables: &mut Tables) -> &mut Table<Record<PoxEvent>> {
		&mut tables.pox_events
	}

	pub fn miner_rewards(tables: &mut Tables) -> &mut Table<MinerReward> {
		&mut tables.miner_rewards
	}

	pub fn burnchain_rewards(tables: &mut Tables) -> &mut Table<BurnchainReward> {
		&mut tables.burnchain_rewards
	}

	pub fn reward_slot_holders(tables: &mut Tables) -> &mut Table<RewardSlotHolder> {
		&mut tables.reward_slot_holders
	}

	pub fn mempool(tables: &mut Tables) -> &mut Table<MempoolTx> {
		&mut tables.mempool
	}
}

use select::TableFn;

fn custody(event: &Record<NftEvent>) -> NftCustody {
	NftCustody {
		asset_identifier: event.data.asset_identifier.clone(),
		value: event.data.value.clone(),
		recipient: event.data.recipient.clone(),
		tx_id: event.confirmation.tx_id,
		block_height: event.confirmation.block_height,
		index_block_hash: event.confirmation.index_block_hash,
		microblock_sequence: event.confirmation.microblock_sequence,
		tx_index: event.confirmation.tx_index,
		event_index: event.data.event_index,
	}
}

impl Tables {
	/// Loads every persisted row and rebuilds lookup hints and NFT custody.
	fn load(backend: &dyn Backend) -> Result<Self, StoreError> {
		let mut tables = Tables::default();
		for (key, value) in backend.load(Column::State)? {
			match key.as_slice() {
				TIP_KEY => tables.tip = decode(Column::State, &value)?,
				POX_STATE_KEY => tables.pox_state = decode(Column::State, &value)?,
				_ => {},
			}
		}
		tables.blocks.load(backend)?;
		tables.microblocks.load(backend)?;
		tables.txs.load(backend)?;
		tables.stx_events.load(backend)?;
		tables.stx_lock_events.load(backend)?;
		tables.ft_events.load(backend)?;
		tables.nft_events.load(backend)?;
		tables.contract_logs.load(backend)?;
		tables.smart_contracts.load(backend)?;
		tables.pox_events.load(backend)?;
		tables.miner_rewards.load(backend)?;
		tables.burnchain_rewards.load(backend)?;
		tables.reward_slot_holders.load(backend)?;
		tables.mempool.load(backend)?;
		tables.reindex();
		Ok(tables)
	}

	fn reindex(&mut self) {
		let indexes = &mut self.indexes;
		self.blocks.iter().for_each(|block| indexes.hint_block(block));
		self.microblocks
			.iter()
			.for_each(|microblock| indexes.hint_microblock(microblock));
		self.txs.iter().for_each(|tx| indexes.hint_tx(&tx.confirmation));
		for event in self.nft_events.iter() {
			hint(&mut indexes.nfts_by_key, event.data.custody_key(), event.tx_id());
		}
		for contract in self.smart_contracts.iter() {
			hint(
				&mut indexes.contracts_by_id,
				contract.data.contract_id.clone(),
				contract.tx_id(),
			);
		}

		let keys: Vec<NftKey> = self.indexes.nfts_by_key.keys().cloned().collect();
		for key in &keys {
			self.refresh_nft_custody(key);
		}
	}

	fn nft_events_for(&self, key: &NftKey) -> Vec<&Record<NftEvent>> {
		hinted(&self.indexes.nfts_by_key, key)
			.iter()
			.flat_map(|tx_id| self.nft_events.get(tx_id))
			.filter(|event| event.data.custody_key() == *key)
			.collect()
	}

	/// Recomputes both custody views of an NFT from its full event history.
	fn refresh_nft_custody(&mut self, key: &NftKey) {
		let events = self.nft_events_for(key);
		let latest = |include: fn(&Confirmation) -> bool| {
			events
				.iter()
				.filter(|event| include(&event.confirmation))
				.max_by_key(|event| (event.confirmation.position(), event.data.event_index))
				.map(|event| custody(event))
		};
		let anchored = latest(Confirmation::is_confirmed);
		let unanchored = latest(Confirmation::is_visible);

		for (view, owner) in [
			(&mut self.nft_custody, anchored),
			(&mut self.nft_custody_unanchored, unanchored),
		] {
			match owner {
				Some(owner) => view.insert(key.clone(), owner),
				None => view.remove(key),
			};
		}
	}
}

impl ChainStore for Tables {
	fn chain_tip(&self) -> ChainTip {
		self.tip.clone()
	}

	fn pox_state(&self) -> PoxState {
		self.pox_state
	}

	fn block(&self, index_block_hash: &H256) -> Option<Block> {
		self.blocks.get(index_block_hash).next().cloned()
	}

	fn blocks_at_height(&self, block_height: u64) -> Vec<Block> {
		hinted(&self.indexes.blocks_by_height, &block_height)
			.iter()
			.flat_map(|hash| self.blocks.get(hash))
			.filter(|block| block.block_height == block_height)
			.cloned()
			.collect()
	}

	fn microblock(&self, microblock_hash: &H256) -> Option<Microblock> {
		self.microblocks.get(microblock_hash).next().cloned()
	}

	fn microblocks_by_parent(&self, parent_index_block_hash: &H256) -> Vec<Microblock> {
		hinted(&self.indexes.microblocks_by_parent, parent_index_block_hash)
			.iter()
			.flat_map(|hash| self.microblocks.get(hash))
			.filter(|microblock| microblock.parent_index_block_hash == *parent_index_block_hash)
			.cloned()
			.collect()
	}

	fn microblocks_at_height(&self, block_height: u64) -> Vec<Microblock> {
		hinted(&self.indexes.microblocks_by_height, &block_height)
			.iter()
			.flat_map(|hash| self.microblocks.get(hash))
			.filter(|microblock| microblock.block_height == block_height)
			.cloned()
			.collect()
	}

	fn txs(&self, tx_id: &H256) -> Vec<TxRecord> {
		self.txs.get(tx_id).cloned().collect()
	}

	fn txs_confirmed_by(&self, index_block_hash: &H256) -> Vec<TxRecord> {
		hinted(&self.indexes.txs_by_block, index_block_hash)
			.iter()
			.flat_map(|tx_id| self.txs.get(tx_id))
			.filter(|tx| tx.confirmation.index_block_hash == *index_block_hash)
			.cloned()
			.collect()
	}

	fn txs_in_microblock(&self, microblock_hash: &H256) -> Vec<TxRecord> {
		hinted(&self.indexes.txs_by_microblock, microblock_hash)
			.iter()
			.flat_map(|tx_id| self.txs.get(tx_id))
			.filter(|tx| tx.confirmation.microblock_hash == *microblock_hash)
			.cloned()
			.collect()
	}

	fn tx_events(&self, tx_id: &H256) -> TxEvents {
		TxEvents {
			stx_events: self.stx_events.get(tx_id).cloned().collect(),
			stx_lock_events: self.stx_lock_events.get(tx_id).cloned().collect(),
			ft_events: self.ft_events.get(tx_id).cloned().collect(),
			nft_events: self.nft_events.get(tx_id).cloned().collect(),
			contract_logs: self.contract_logs.get(tx_id).cloned().collect(),
			smart_contracts: self.smart_contracts.get(tx_id).cloned().collect(),
			pox_events: self.pox_events.get(tx_id).cloned().collect(),
		}
	}

	fn mempool_tx(&self, tx_id: &H256) -> Option<MempoolTx> {
		self.mempool.get(tx_id).next().cloned()
	}

	fn mempool_txs(&self) -> Vec<MempoolTx> {
		self.mempool.iter().cloned().collect()
	}

	fn smart_contract(&self, contract_id: &str) -> Vec<Record<SmartContract>> {
		hinted(&self.indexes.contracts_by_id, contract_id)
			.iter()
			.flat_map(|tx_id| self.smart_contracts.get(tx_id))
			.filter(|contract| contract.data.contract_id == contract_id)
			.cloned()
			.collect()
	}

	fn miner_rewards(&self, index_block_hash: &H256) -> Vec<MinerReward> {
		self.miner_rewards.get(index_block_hash).cloned().collect()
	}

	fn burnchain_rewards(&self, burn_block_hash: &H256) -> Vec<BurnchainReward> {
		self.burnchain_rewards.get(burn_block_hash).cloned().collect()
	}

	fn reward_slot_holders(&self, burn_block_hash: &H256) -> Vec<RewardSlotHolder> {
		self.reward_slot_holders.get(burn_block_hash).cloned().collect()
	}

	fn nft_custody(&self, key: &NftKey, unanchored: bool) -> Option<NftCustody> {
		let view = if unanchored {
			&self.nft_custody_unanchored
		} else {
			&self.nft_custody
		};
		view.get(key).cloned()
	}
}

/// Chain state shared between the ingestion worker and readers.
///
/// Tables live in memory. With a [`Backend`] every commit is also written
/// through to it, so the state survives restarts.
#[derive(Clone, Default)]
pub struct MemoryStore {
	tables: Arc<RwLock<Tables>>,
	backend: Option<Arc<dyn Backend>>,
}

impl MemoryStore {
	/// Opens a store over `backend`, loading everything it holds.
	pub fn open(backend: Arc<dyn Backend>) -> Result<Self, StoreError> {
		let tables = Tables::load(&*backend)?;
		info!(
			block_height = tables.tip.block_height,
			index_block_hash = %tables.tip.index_block_hash,
			blocks = tables.blocks.len(),
			txs = tables.txs.len(),
			"Loaded chain state"
		);
		Ok(MemoryStore {
			tables: Arc::new(RwLock::new(tables)),
			backend: Some(backend),
		})
	}

	// A writer that panicked has already rolled back in its drop, so a
	// poisoned lock still guards consistent tables.
	pub fn read(&self) -> RwLockReadGuard<'_, Tables> {
		self.tables.read().unwrap_or_else(PoisonError::into_inner)
	}

	/// Starts a write transaction. Readers are blocked until it ends.
	pub fn begin(&self) -> StoreWriter<'_> {
		StoreWriter {
			tables: self.tables.write().unwrap_or_else(PoisonError::into_inner),
			backend: self.backend.as_deref(),
			journal: vec![],
			dirty: BTreeMap::new(),
			state_dirty: false,
			touched_nfts: HashSet::new(),
		}
	}
}

type Undo = Box<dyn FnOnce(&mut Tables)>;
type Encode = Box<dyn Fn(&mut Tables) -> Result<Vec<u8>, StoreError>>;

/// Outcome of a confirmation update across transactions and their events.
#[derive(Debug, Default)]
pub struct ConfirmationUpdate {
	/// Transactions with at least one row selected by the filter.
	pub matched: Vec<H256>,
	/// Transactions with at least one row actually modified.
	pub changed: Vec<H256>,
	/// Modified event and side rows.
	pub events: usize,
}

/// Exclusive write access to the store.
///
/// Every write records how to undo itself. Dropping the writer without
/// calling [`StoreWriter::commit`] replays the journal backwards, leaving the
/// store exactly as it was. Rows written are tracked by table position so a
/// commit persists exactly those.
pub struct StoreWriter<'a> {
	tables: RwLockWriteGuard<'a, Tables>,
	backend: Option<&'a dyn Backend>,
	journal: Vec<Undo>,
	dirty: BTreeMap<(Column, usize), Encode>,
	state_dirty: bool,
	touched_nfts: HashSet<NftKey>,
}

impl Deref for StoreWriter<'_> {
	type Target = Tables;

	fn deref(&self) -> &Tables {
		&self.tables
	}
}

impl Drop for StoreWriter<'_> {
	fn drop(&mut self) {
		if self.journal.is_empty() {
			return;
		}
		let writes = self.journal.len();
		while let Some(undo) = self.journal.pop() {
			undo(&mut self.tables);
		}
		debug!(writes, "Rolled back uncommitted store writes");
	}
}

impl StoreWriter<'_> {
	/// Makes all writes permanent and refreshes derived NFT custody.
	///
	/// With a backend the written rows go out as one batch first. If that
	/// fails nothing is committed and the writer rolls back.
	pub fn commit(mut self) -> Result<(), StoreError> {
		if let Some(backend) = self.backend {
			let entries = self.entries()?;
			let count = entries.len();
			backend.write(entries)?;
			trace!(entries = count, "Persisted store writes");
		}
		for key in std::mem::take(&mut self.touched_nfts) {
			self.tables.refresh_nft_custody(&key);
		}
		trace!(writes = self.journal.len(), "Committed store writes");
		self.journal.clear();
		Ok(())
	}

	fn entries(&mut self) -> Result<Vec<Entry>, StoreError> {
		let mut entries = vec![];
		if self.state_dirty {
			entries.push(Entry {
				column: Column::State,
				key: TIP_KEY.to_vec(),
				value: encode(Column::State, &self.tables.tip)?,
			});
			entries.push(Entry {
				column: Column::State,
				key: POX_STATE_KEY.to_vec(),
				value: encode(Column::State, &self.tables.pox_state)?,
			});
		}
		for ((column, position), encode_row) in std::mem::take(&mut self.dirty) {
			entries.push(Entry {
				column,
				key: position_key(position),
				value: encode_row(&mut self.tables)?,
			});
		}
		Ok(entries)
	}

	/// Tracks a written row for the next commit.
	fn mark<T: Row>(&mut self, table: TableFn<T>, position: usize) {
		if self.backend.is_none() {
			return;
		}
		let column = table(&mut self.tables).column;
		self.dirty.entry((column, position)).or_insert_with(|| {
			Box::new(move |tables: &mut Tables| encode(column, &table(tables).rows[position]))
		});
	}

	fn push_row<T: Row>(&mut self, table: TableFn<T>, row: T) {
		let position = table(&mut self.tables).len();
		table(&mut self.tables).push(row);
		self.mark(table, position);
		self.journal.push(Box::new(move |tables: &mut Tables| table(tables).pop()));
	}

	fn update_positions<T: Row>(
		&mut self,
		table: TableFn<T>,
		positions: Vec<usize>,
		filter: &dyn Fn(&T) -> bool,
		apply: &dyn Fn(&mut T),
	) -> (usize, Vec<(T, T)>) {
		let mut matched = 0;
		let mut changed = vec![];
		for position in positions {
			let current = table(&mut self.tables).rows[position].clone();
			if !filter(&current) {
				continue;
			}
			matched += 1;

			let mut updated = current.clone();
			apply(&mut updated);
			if updated == current {
				continue;
			}
			table(&mut self.tables).rows[position] = updated.clone();
			self.mark(table, position);
			let old = current.clone();
			self.journal
				.push(Box::new(move |tables: &mut Tables| table(tables).rows[position] = old));
			changed.push((current, updated));
		}
		(matched, changed)
	}

	fn update_rows<T: Row>(
		&mut self,
		table: TableFn<T>,
		key: &H256,
		filter: &dyn Fn(&T) -> bool,
		apply: &dyn Fn(&mut T),
	) -> (usize, Vec<(T, T)>) {
		let positions = table(&mut self.tables).positions(key);
		self.update_positions(table, positions, filter, apply)
	}

	fn update_where<T: Row>(
		&mut self,
		table: TableFn<T>,
		filter: &dyn Fn(&T) -> bool,
		apply: &dyn Fn(&mut T),
	) -> usize {
		let positions = (0..table(&mut self.tables).len()).collect();
		self.update_positions(table, positions, filter, apply).1.len()
	}

	fn update_records<T: Clone + PartialEq + Serialize + DeserializeOwned + 'static>(
		&mut self,
		table: TableFn<Record<T>>,
		tx_id: &H256,
		filter: &dyn Fn(&Confirmation) -> bool,
		apply: &dyn Fn(&mut Confirmation),
	) -> (usize, Vec<(Record<T>, Record<T>)>) {
		self.update_rows(
			table,
			tx_id,
			&|row: &Record<T>| filter(&row.confirmation),
			&|row: &mut Record<T>| apply(&mut row.confirmation),
		)
	}

	pub fn modify_tip(&mut self, apply: impl FnOnce(&mut ChainTip)) {
		let old = self.tables.tip.clone();
		apply(&mut self.tables.tip);
		if self.tables.tip != old {
			self.state_dirty = true;
			self.journal.push(Box::new(move |tables: &mut Tables| tables.tip = old));
		}
	}

	pub fn set_pox_state(&mut self, pox_state: PoxState) {
		let old = std::mem::replace(&mut self.tables.pox_state, pox_state);
		if self.tables.pox_state != old {
			self.state_dirty = true;
		}
		self.journal
			.push(Box::new(move |tables: &mut Tables| tables.pox_state = old));
	}

	/// Keeps the tip transaction counters in step with a row's flags.
	fn count_tx(&mut self, old: Option<&Confirmation>, new: &Confirmation) {
		let delta = |flag: fn(&Confirmation) -> bool| {
			i64::from(flag(new)) - i64::from(old.is_some_and(flag))
		};
		let confirmed = delta(Confirmation::is_confirmed);
		let visible = delta(Confirmation::is_visible);
		if confirmed == 0 && visible == 0 {
			return;
		}
		self.modify_tip(|tip| {
			tip.tx_count = tip.tx_count.saturating_add_signed(confirmed);
			tip.tx_count_unanchored = tip.tx_count_unanchored.saturating_add_signed(visible);
		});
	}

	/// Inserts a block unless one with the same index block hash exists.
	pub fn insert_block(&mut self, block: Block) -> bool {
		if self.tables.blocks.get(&block.index_block_hash).next().is_some() {
			return false;
		}
		self.tables.indexes.hint_block(&block);
		self.push_row(select::blocks, block);
		true
	}

	pub fn update_block(&mut self, index_block_hash: &H256, apply: impl Fn(&mut Block)) -> bool {
		let (_, changed) = self.update_rows(select::blocks, index_block_hash, &|_| true, &apply);
		!changed.is_empty()
	}

	/// Inserts a microblock unless one with the same hash exists.
	pub fn insert_microblock(&mut self, microblock: Microblock) -> bool {
		if self.tables.microblocks.get(&microblock.microblock_hash).next().is_some() {
			return false;
		}
		self.tables.indexes.hint_microblock(&microblock);
		self.push_row(select::microblocks, microblock);
		true
	}

	/// Returns the number of microblocks found, changed or not.
	pub fn update_microblocks(&mut self, hashes: &[H256], apply: impl Fn(&mut Microblock)) -> usize {
		hashes
			.iter()
			.unique()
			.map(|hash| self.update_rows(select::microblocks, hash, &|_| true, &apply).0)
			.sum()
	}

	/// Inserts a transaction with everything it produced.
	///
	/// A row already confirmed at the same block and microblock makes this a no-op.
	pub fn insert_tx(&mut self, update: TxUpdate) -> bool {
		let TxUpdate {
			tx,
			microblock_parent_hash: _,
			stx_events,
			stx_lock_events,
			ft_events,
			nft_events,
			contract_logs,
			smart_contracts,
			pox_events,
		} = update;
		let confirmation = tx.confirmation.clone();

		let duplicate = self.tables.txs.get(&confirmation.tx_id).any(|row| {
			row.confirmation.index_block_hash == confirmation.index_block_hash
				&& row.confirmation.microblock_hash == confirmation.microblock_hash
		});
		if duplicate {
			trace!(tx_id = %confirmation.tx_id, "Transaction already stored");
			return false;
		}

		self.tables.indexes.hint_tx(&confirmation);
		self.count_tx(None, &confirmation);
		self.push_row(select::txs, tx);

		for event in stx_events {
			self.push_row(select::stx_events, event);
		}
		for event in stx_lock_events {
			self.push_row(select::stx_lock_events, event);
		}
		for event in ft_events {
			self.push_row(select::ft_events, event);
		}
		for event in nft_events {
			let key = event.data.custody_key();
			hint(&mut self.tables.indexes.nfts_by_key, key.clone(), event.tx_id());
			self.touched_nfts.insert(key);
			self.push_row(select::nft_events, event);
		}
		for log in contract_logs {
			self.push_row(select::contract_logs, log);
		}
		for contract in smart_contracts {
			hint(
				&mut self.tables.indexes.contracts_by_id,
				contract.data.contract_id.clone(),
				contract.tx_id(),
			);
			self.push_row(select::smart_contracts, contract);
		}
		for event in pox_events {
			self.push_row(select::pox_events, event);
		}
		true
	}

	/// Updates confirmations of transactions and of every row they produced.
	pub fn update_confirmations(
		&mut self,
		tx_ids: &[H256],
		filter: impl Fn(&Confirmation) -> bool,
		apply: impl Fn(&mut Confirmation),
	) -> ConfirmationUpdate {
		let mut update = ConfirmationUpdate::default();
		for tx_id in tx_ids.iter().unique() {
			let (matched, changed) = self.update_records(select::txs, tx_id, &filter, &apply);
			if matched > 0 {
				update.matched.push(*tx_id);
			}
			if !changed.is_empty() {
				update.changed.push(*tx_id);
			}
			for (old, new) in &changed {
				self.count_tx(Some(&old.confirmation), &new.confirmation);
				self.tables.indexes.hint_tx(&new.confirmation);
			}

			update.events += self
				.update_records(select::stx_events, tx_id, &filter, &apply)
				.1
				.len();
			update.events += self
				.update_records(select::stx_lock_events, tx_id, &filter, &apply)
				.1
				.len();
			update.events += self
				.update_records(select::ft_events, tx_id, &filter, &apply)
				.1
				.len();
			update.events += self
				.update_records(select::contract_logs, tx_id, &filter, &apply)
				.1
				.len();
			update.events += self
				.update_records(select::smart_contracts, tx_id, &filter, &apply)
				.1
				.len();
			update.events += self
				.update_records(select::pox_events, tx_id, &filter, &apply)
				.1
				.len();

			let (_, nfts) = self.update_records(select::nft_events, tx_id, &filter, &apply);
			for (_, event) in &nfts {
				self.touched_nfts.insert(event.data.custody_key());
			}
			update.events += nfts.len();
		}
		update
	}

	pub fn insert_miner_reward(&mut self, reward: MinerReward) {
		self.push_row(select::miner_rewards, reward);
	}

	pub fn update_miner_rewards(
		&mut self,
		index_block_hash: &H256,
		apply: impl Fn(&mut MinerReward),
	) -> usize {
		self.update_rows(select::miner_rewards, index_block_hash, &|_| true, &apply)
			.1
			.len()
	}

	pub fn insert_burnchain_reward(&mut self, reward: BurnchainReward) {
		self.push_row(select::burnchain_rewards, reward);
	}

	pub fn update_burnchain_rewards(
		&mut self,
		filter: impl Fn(&BurnchainReward) -> bool,
		apply: impl Fn(&mut BurnchainReward),
	) -> usize {
		self.update_where(select::burnchain_rewards, &filter, &apply)
	}

	pub fn insert_reward_slot_holder(&mut self, holder: RewardSlotHolder) {
		self.push_row(select::reward_slot_holders, holder);
	}

	pub fn update_reward_slot_holders(
		&mut self,
		filter: impl Fn(&RewardSlotHolder) -> bool,
		apply: impl Fn(&mut RewardSlotHolder),
	) -> usize {
		self.update_where(select::reward_slot_holders, &filter, &apply)
	}

	/// Inserts a mempool row unless the transaction already has one.
	pub fn insert_mempool_tx(&mut self, tx: MempoolTx) -> bool {
		if self.tables.mempool.get(&tx.tx_id).next().is_some() {
			return false;
		}
		if !tx.pruned {
			self.modify_tip(|tip| tip.mempool_tx_count += 1);
		}
		self.push_row(select::mempool, tx);
		true
	}

	/// Updates mempool rows, keeping the tip pending counter in step.
	/// Returns the transactions whose row changed.
	pub fn update_mempool_txs(
		&mut self,
		tx_ids: &[H256],
		filter: impl Fn(&MempoolTx) -> bool,
		apply: impl Fn(&mut MempoolTx),
	) -> Vec<H256> {
		let mut changed_ids = vec![];
		let (mut added, mut removed) = (0u64, 0u64);
		for tx_id in tx_ids.iter().unique() {
			let (_, changed) = self.update_rows(select::mempool, tx_id, &filter, &apply);
			for (old, new) in &changed {
				match (old.pruned, new.pruned) {
					(true, false) => added += 1,
					(false, true) => removed += 1,
					_ => {},
				}
			}
			if !changed.is_empty() {
				changed_ids.push(*tx_id);
			}
		}
		if added != removed {
			self.modify_tip(|tip| {
				tip.mempool_tx_count = (tip.mempool_tx_count + added).saturating_sub(removed);
			});
		}
		changed_ids
	}
}
