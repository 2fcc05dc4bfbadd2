//! Chain state engine.
//!
//! Applies normalized updates to the store. Every operation runs in a single
//! store transaction: an error drops the writer and rolls everything back.
//! Notifications go out only after commit. Callers must not run operations
//! concurrently; the ingestion sequencer guarantees this.

use crate::{
	data::{ChainStore, MemoryStore, StoreWriter},
	error::{ChainError, MicroblockGap},
	mempool,
	notifications::{ChangeSet, Notifier},
	types::{
		BlockUpdate, BurnBlockUpdate, ChainTip, MempoolDrop, MempoolTx, MicroblockUpdate, Network,
		TxUpdate, H256,
	},
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace, warn};

mod microblocks;
mod reorg;
mod stats;

pub use microblocks::{find_unanchored_microblocks_at_chain_tip, MicroblockWalk};
pub use reorg::{Marked, ReorgCounters};
pub use stats::{MempoolStats, MempoolStatsScheduler, Percentiles};

use microblocks::Anchor;

#[derive(Clone, Debug)]
pub struct ChainConfig {
	pub network: Network,
	/// Pending mempool transactions older than this many blocks are dropped.
	pub mempool_gc_threshold_blocks: u64,
	pub mempool_stats_debounce: Duration,
	/// Chain height below which the node is still in initial block download.
	pub ibd_height: Option<u64>,
}

impl Default for ChainConfig {
	fn default() -> Self {
		ChainConfig {
			network: Network::Mainnet,
			mempool_gc_threshold_blocks: 256,
			mempool_stats_debounce: Duration::from_millis(1000),
			ibd_height: None,
		}
	}
}

impl ChainConfig {
	fn in_ibd(&self, block_height: u64) -> bool {
		self.ibd_height.is_some_and(|ibd_height| block_height < ibd_height)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockOutcome {
	Applied {
		canonical: bool,
		reorg: ReorgCounters,
	},
	/// Block was already ingested, nothing was written.
	Duplicate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MicroblockOutcome {
	Applied { accepted: usize, orphaned: usize },
	/// Batch does not extend the chain tip.
	Ignored,
	/// Stream cannot be linked back to sequence 0, batch rolled back.
	GapDetected(MicroblockGap),
}

pub struct ChainEngine {
	store: MemoryStore,
	notifier: Notifier,
	config: ChainConfig,
	stats: MempoolStatsScheduler,
	/// Last committed tip, readable without touching the store lock.
	tip: watch::Sender<ChainTip>,
}

impl ChainEngine {
	pub fn new(store: MemoryStore, notifier: Notifier, config: ChainConfig) -> Self {
		let stats = MempoolStatsScheduler::new(
			store.clone(),
			notifier.clone(),
			config.mempool_stats_debounce,
		);
		let (tip, _) = watch::channel(store.read().chain_tip());
		ChainEngine {
			store,
			notifier,
			config,
			stats,
			tip,
		}
	}

	pub fn store(&self) -> &MemoryStore {
		&self.store
	}

	pub fn network(&self) -> Network {
		self.config.network
	}

	pub fn chain_tip(&self) -> ChainTip {
		self.tip.borrow().clone()
	}

	pub fn subscribe_tip(&self) -> watch::Receiver<ChainTip> {
		self.tip.subscribe()
	}

	/// Chain tip is still below the configured initial block download height.
	pub fn is_ibd(&self) -> bool {
		self.config.in_ibd(self.chain_tip().block_height)
	}

	fn commit(&self, writer: StoreWriter<'_>) -> Result<(), ChainError> {
		let tip = writer.chain_tip();
		writer.commit()?;
		self.tip.send_replace(tip);
		Ok(())
	}

	/// Stops background statistics.
	pub fn close(&self) {
		self.stats.close();
	}

	#[instrument(
		level = "debug",
		skip_all,
		fields(block_height = update.block.block_height, index_block_hash = %update.block.index_block_hash)
	)]
	pub fn apply_block(&self, update: BlockUpdate) -> Result<BlockOutcome, ChainError> {
		let BlockUpdate {
			mut block,
			mut microblocks,
			mut txs,
			mut miner_rewards,
			pox_state,
		} = update;

		let mut writer = self.store.begin();
		let tip = writer.chain_tip();
		if writer.block(&block.index_block_hash).is_some() {
			info!(
				block_height = block.block_height,
				index_block_hash = %block.index_block_hash,
				"Block already ingested, skipping"
			);
			return Ok(BlockOutcome::Duplicate);
		}

		let canonical = tip.index_block_hash.is_zero() || block.block_height > tip.block_height;
		let mut counters = ReorgCounters::default();
		let mut changes = ChangeSet::default();

		if canonical {
			reorg::handle_reorg(&mut writer, &block, &mut counters, &mut changes)?;
		} else {
			info!(
				block_height = block.block_height,
				index_block_hash = %block.index_block_hash,
				tip_height = tip.block_height,
				"Block does not extend the chain tip, inserting as non-canonical"
			);
			block.canonical = false;
			microblocks.iter_mut().for_each(|microblock| microblock.canonical = false);
			txs.iter_mut().for_each(|tx| tx.for_each_confirmation(|c| c.canonical = false));
			miner_rewards.iter_mut().for_each(|reward| reward.canonical = false);
		}

		let batch_tx_ids: Vec<H256> = txs.iter().map(TxUpdate::tx_id).collect();
		if self.config.in_ibd(block.block_height) {
			txs.iter_mut().for_each(TxUpdate::drop_prunable_events);
		}

		for microblock in microblocks {
			if writer.microblock(&microblock.microblock_hash).is_none() {
				changes.microblock(&microblock);
				writer.insert_microblock(microblock);
			}
		}

		let (streamed, anchored): (Vec<TxUpdate>, Vec<TxUpdate>) = txs
			.into_iter()
			.partition(|tx| !tx.tx.confirmation.is_anchored());
		for tx in streamed {
			changes.tx(&tx);
			let confirmation = &tx.tx.confirmation;
			// rows from the microblock stream get confirmed in place
			let unconfirmed = writer.txs(&confirmation.tx_id).iter().any(|row| {
				row.confirmation.index_block_hash.is_zero()
					&& row.confirmation.microblock_hash == confirmation.microblock_hash
			});
			if unconfirmed {
				trace!(tx_id = %confirmation.tx_id, "Microblock transaction already streamed");
				continue;
			}
			writer.insert_tx(tx);
		}

		if canonical {
			let resolution =
				microblocks::update_micro_canonical(&mut writer, &block, true, &mut counters)?;
			let orphaned: Vec<H256> = resolution
				.orphaned_txs
				.into_iter()
				.filter(|tx_id| !batch_tx_ids.contains(tx_id))
				.collect();
			mempool::restore(&mut writer, &orphaned);
			orphaned.into_iter().for_each(|tx_id| changes.tx_id(tx_id));
		}

		changes.block(&block);
		writer.insert_block(block.clone());
		for tx in anchored {
			changes.tx(&tx);
			writer.insert_tx(tx);
		}
		for reward in miner_rewards {
			writer.insert_miner_reward(reward);
		}

		let mut schedule_stats = false;
		if canonical {
			writer.modify_tip(|tip| {
				tip.block_height = block.block_height;
				tip.index_block_hash = block.index_block_hash;
				tip.block_hash = block.block_hash;
				tip.burn_block_height = block.burn_block_height;
				tip.microblock_hash = None;
				tip.microblock_sequence = None;
				tip.microblock_count = 0;
			});
			writer.set_pox_state(pox_state);
			let pruned = mempool::prune(&mut writer, &batch_tx_ids);
			trace!(pruned, "Pruned confirmed mempool transactions");

			if !self.config.in_ibd(block.block_height) {
				let collected =
					mempool::garbage_collect(&mut writer, self.config.mempool_gc_threshold_blocks);
				if !collected.is_empty() {
					debug!(collected = collected.len(), "Garbage collected stale mempool transactions");
				}
				schedule_stats = true;
			}
		}
		mempool::reconcile(&mut writer);
		self.commit(writer)?;

		if counters.is_reorg() {
			counters.log(&block.index_block_hash);
		}
		debug!(
			block_height = block.block_height,
			index_block_hash = %block.index_block_hash,
			canonical,
			"Block applied"
		);
		self.notifier.publish(changes.into_notifications());
		if schedule_stats {
			self.stats.schedule();
		}

		Ok(BlockOutcome::Applied {
			canonical,
			reorg: counters,
		})
	}

	#[instrument(
		level = "debug",
		skip_all,
		fields(parent_index_block_hash = %update.parent_index_block_hash)
	)]
	pub fn apply_microblocks(&self, update: MicroblockUpdate) -> Result<MicroblockOutcome, ChainError> {
		let MicroblockUpdate {
			parent_index_block_hash,
			mut microblocks,
			mut txs,
		} = update;

		let mut writer = self.store.begin();
		let tip = writer.chain_tip();
		if parent_index_block_hash != tip.index_block_hash {
			info!(
				%parent_index_block_hash,
				tip_index_block_hash = %tip.index_block_hash,
				"Microblocks do not extend the chain tip, ignoring"
			);
			return Ok(MicroblockOutcome::Ignored);
		}
		let Some(stream_tip) = microblocks.last().map(|microblock| microblock.microblock_hash) else {
			return Ok(MicroblockOutcome::Ignored);
		};

		let block_height = tip.block_height + 1;
		let parent = writer.block(&tip.index_block_hash).unwrap_or_default();
		for microblock in &mut microblocks {
			microblock.block_height = block_height;
			microblock.parent_block_height = tip.block_height;
			microblock.parent_block_hash = tip.block_hash;
			microblock.parent_burn_block_height = parent.burn_block_height;
			microblock.parent_burn_block_hash = parent.burn_block_hash;
			microblock.parent_burn_block_time = parent.burn_block_time;
		}
		for tx in &mut txs {
			tx.for_each_confirmation(|confirmation| confirmation.block_height = block_height);
		}

		let mut changes = ChangeSet::default();
		for microblock in microblocks {
			if writer.microblock(&microblock.microblock_hash).is_none() {
				changes.microblock(&microblock);
				writer.insert_microblock(microblock);
			}
		}
		let batch_tx_ids: Vec<H256> = txs.iter().map(TxUpdate::tx_id).collect();
		for tx in txs {
			changes.tx(&tx);
			writer.insert_tx(tx);
		}

		let walk = find_unanchored_microblocks_at_chain_tip(
			&*writer,
			&parent_index_block_hash,
			block_height,
			&stream_tip,
		);
		let (accepted, orphaned) = match walk {
			Some(MicroblockWalk::Resolved { accepted, orphaned }) => (accepted, orphaned),
			Some(MicroblockWalk::Gap(gap)) => {
				drop(writer);
				warn!(%gap, "Gap in microblock stream, batch dropped");
				return Ok(MicroblockOutcome::GapDetected(gap));
			},
			None => {
				return Err(ChainError::MissingParentMicroblock {
					microblock_hash: stream_tip,
					parent_index_block_hash,
				})
			},
		};

		let mut counters = ReorgCounters::default();
		let anchor = Anchor::unconfirmed();
		let orphaned_txs =
			microblocks::handle_micro_reorg(&mut writer, true, false, &anchor, &orphaned, &mut counters)?;
		let accepted_txs =
			microblocks::handle_micro_reorg(&mut writer, true, true, &anchor, &accepted, &mut counters)?;

		let restored: Vec<H256> = orphaned_txs
			.into_iter()
			.filter(|tx_id| !accepted_txs.contains(tx_id))
			.collect();
		if !restored.is_empty() {
			info!(
				orphaned_microblocks = orphaned.len(),
				restored_txs = restored.len(),
				"Microblock fork orphaned transactions"
			);
		}
		mempool::restore(&mut writer, &restored);
		mempool::prune(&mut writer, &batch_tx_ids);
		mempool::reconcile(&mut writer);
		restored.into_iter().for_each(|tx_id| changes.tx_id(tx_id));

		let latest = accepted.last().map(|microblock| (microblock.microblock_hash, microblock.microblock_sequence));
		let accepted_count = accepted.len();
		writer.modify_tip(|tip| {
			tip.microblock_hash = latest.map(|(hash, _)| hash);
			tip.microblock_sequence = latest.map(|(_, sequence)| sequence);
			tip.microblock_count = accepted_count as u32;
		});
		self.commit(writer)?;

		debug!(
			block_height,
			accepted = accepted_count,
			orphaned = orphaned.len(),
			"Microblocks applied"
		);
		self.notifier.publish(changes.into_notifications());
		self.stats.schedule();

		Ok(MicroblockOutcome::Applied {
			accepted: accepted_count,
			orphaned: orphaned.len(),
		})
	}

	/// Records burnchain rewards, invalidating rows of forked burn blocks.
	#[instrument(level = "debug", skip_all, fields(burn_block_height = update.burn_block_height))]
	pub fn apply_burn_block(&self, update: BurnBlockUpdate) -> Result<(), ChainError> {
		let BurnBlockUpdate {
			burn_block_hash,
			burn_block_height,
			rewards,
			slot_holders,
		} = update;

		let mut writer = self.store.begin();
		let invalidated_rewards = writer.update_burnchain_rewards(
			|reward| {
				reward.canonical
					&& (reward.burn_block_hash == burn_block_hash
						|| reward.burn_block_height >= burn_block_height)
			},
			|reward| reward.canonical = false,
		);
		let invalidated_slots = writer.update_reward_slot_holders(
			|holder| {
				holder.canonical
					&& (holder.burn_block_hash == burn_block_hash
						|| holder.burn_block_height >= burn_block_height)
			},
			|holder| holder.canonical = false,
		);
		if invalidated_rewards + invalidated_slots > 0 {
			warn!(
				burn_block_height,
				%burn_block_hash,
				rewards = invalidated_rewards,
				slot_holders = invalidated_slots,
				"Invalidated burnchain rows of a forked burn block"
			);
		}

		let (reward_count, slot_count) = (rewards.len(), slot_holders.len());
		rewards
			.into_iter()
			.for_each(|reward| writer.insert_burnchain_reward(reward));
		slot_holders
			.into_iter()
			.for_each(|holder| writer.insert_reward_slot_holder(holder));
		self.commit(writer)?;

		debug!(
			burn_block_height,
			rewards = reward_count,
			slot_holders = slot_count,
			"Burn block applied"
		);
		Ok(())
	}

	/// Returns the transactions newly added to the mempool.
	pub fn apply_mempool_txs(&self, txs: Vec<MempoolTx>) -> Result<Vec<H256>, ChainError> {
		let mut writer = self.store.begin();
		let inserted = mempool::insert(&mut writer, txs);
		self.commit(writer)?;

		debug!(inserted = inserted.len(), "Mempool transactions received");
		let mut changes = ChangeSet::default();
		inserted.iter().for_each(|tx_id| changes.tx_id(*tx_id));
		self.notifier.publish(changes.into_notifications());
		self.stats.schedule();
		Ok(inserted)
	}

	/// Returns the transactions removed from the pending set.
	pub fn drop_mempool_txs(&self, request: MempoolDrop) -> Result<Vec<H256>, ChainError> {
		let mut writer = self.store.begin();
		let dropped = mempool::drop_explicit(&mut writer, &request.tx_ids, request.status);
		self.commit(writer)?;

		debug!(
			dropped = dropped.len(),
			status = %request.status,
			"Mempool transactions dropped"
		);
		let mut changes = ChangeSet::default();
		dropped.iter().for_each(|tx_id| changes.tx_id(*tx_id));
		self.notifier.publish(changes.into_notifications());
		self.stats.schedule();
		Ok(dropped)
	}
}
