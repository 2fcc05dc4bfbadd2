use super::microblocks;
use crate::{
	data::{ChainStore, StoreWriter},
	error::ChainError,
	mempool,
	notifications::ChangeSet,
	types::{Block, H256},
};
use tracing::{debug, info};

/// Rows marked canonical and orphaned for one entity kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Marked {
	pub canonical: usize,
	pub orphaned: usize,
}

impl Marked {
	pub fn add(&mut self, canonical: bool, rows: usize) {
		if canonical {
			self.canonical += rows;
		} else {
			self.orphaned += rows;
		}
	}
}

/// Tally of rows flipped while resolving a reorg. Diagnostic only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReorgCounters {
	pub blocks: Marked,
	pub microblocks: Marked,
	pub txs: Marked,
	pub events: Marked,
	pub miner_rewards: Marked,
}

impl ReorgCounters {
	/// Blocks changed canonical status or rows were orphaned.
	pub fn is_reorg(&self) -> bool {
		self.blocks != Marked::default()
			|| [self.microblocks, self.txs, self.events, self.miner_rewards]
				.iter()
				.any(|marked| marked.orphaned > 0)
	}

	pub fn log(&self, index_block_hash: &H256) {
		info!(
			%index_block_hash,
			blocks_canonical = self.blocks.canonical,
			blocks_orphaned = self.blocks.orphaned,
			microblocks_canonical = self.microblocks.canonical,
			microblocks_orphaned = self.microblocks.orphaned,
			txs_canonical = self.txs.canonical,
			txs_orphaned = self.txs.orphaned,
			events_canonical = self.events.canonical,
			events_orphaned = self.events.orphaned,
			miner_rewards_canonical = self.miner_rewards.canonical,
			miner_rewards_orphaned = self.miner_rewards.orphaned,
			"Chain reorg resolved"
		);
	}
}

/// Restores the orphaned parent chain of a block about to become canonical.
pub fn handle_reorg(
	writer: &mut StoreWriter,
	block: &Block,
	counters: &mut ReorgCounters,
	changes: &mut ChangeSet,
) -> Result<(), ChainError> {
	let Some(parent_height) = block.block_height.checked_sub(1) else {
		return Ok(());
	};
	let orphaned_parents: Vec<Block> = writer
		.blocks_at_height(parent_height)
		.into_iter()
		.filter(|parent| {
			parent.index_block_hash == block.parent_index_block_hash && !parent.canonical
		})
		.collect();

	match orphaned_parents.as_slice() {
		[] => Ok(()),
		[parent] => {
			info!(
				block_height = block.block_height,
				index_block_hash = %block.index_block_hash,
				parent_index_block_hash = %parent.index_block_hash,
				"Block extends an orphaned chain, restoring it"
			);
			restore_orphaned_chain(writer, &parent.index_block_hash, counters, changes)
		},
		_ => Err(ChainError::MultipleNonCanonicalParents(block.index_block_hash)),
	}
}

/// Makes an orphaned block canonical again, together with its orphaned ancestors.
///
/// The canonical sibling at the same height is orphaned and its transactions
/// return to the mempool.
pub fn restore_orphaned_chain(
	writer: &mut StoreWriter,
	index_block_hash: &H256,
	counters: &mut ReorgCounters,
	changes: &mut ChangeSet,
) -> Result<(), ChainError> {
	let Some(mut restored) = writer
		.block(index_block_hash)
		.filter(|block| !block.canonical)
	else {
		return Err(ChainError::MissingOrphanedBlock(*index_block_hash));
	};
	writer.update_block(index_block_hash, |block| block.canonical = true);
	restored.canonical = true;
	counters.blocks.add(true, 1);
	changes.block(&restored);

	let siblings: Vec<Block> = writer
		.blocks_at_height(restored.block_height)
		.into_iter()
		.filter(|block| block.canonical && block.index_block_hash != *index_block_hash)
		.collect();
	for sibling in siblings {
		debug!(
			block_height = sibling.block_height,
			index_block_hash = %sibling.index_block_hash,
			"Orphaning sibling block"
		);
		writer.update_block(&sibling.index_block_hash, |block| block.canonical = false);
		counters.blocks.add(false, 1);
		changes.block(&sibling);

		let resolution = microblocks::update_micro_canonical(writer, &sibling, false, counters)?;
		let orphaned = mark_entities_canonical(writer, &sibling.index_block_hash, false, counters);
		let orphaned: Vec<H256> = orphaned
			.into_iter()
			.chain(resolution.accepted_txs)
			.chain(resolution.orphaned_txs)
			.collect();
		mempool::restore(writer, &orphaned);
		orphaned.into_iter().for_each(|tx_id| changes.tx_id(tx_id));
	}

	let resolution = microblocks::update_micro_canonical(writer, &restored, true, counters)?;
	let confirmed = mark_entities_canonical(writer, index_block_hash, true, counters);
	let confirmed: Vec<H256> = confirmed.into_iter().chain(resolution.accepted_txs).collect();
	mempool::prune(writer, &confirmed);
	mempool::restore(writer, &resolution.orphaned_txs);
	confirmed
		.into_iter()
		.chain(resolution.orphaned_txs)
		.for_each(|tx_id| changes.tx_id(tx_id));

	let orphaned_parent = writer
		.block(&restored.parent_index_block_hash)
		.filter(|parent| !parent.canonical);
	if let Some(parent) = orphaned_parent {
		restore_orphaned_chain(writer, &parent.index_block_hash, counters, changes)?;
	}
	Ok(())
}

/// Flips `canonical` on everything confirmed by a block.
///
/// Returns the transactions confirmed by the block.
pub fn mark_entities_canonical(
	writer: &mut StoreWriter,
	index_block_hash: &H256,
	canonical: bool,
	counters: &mut ReorgCounters,
) -> Vec<H256> {
	let tx_ids: Vec<H256> = writer
		.txs_confirmed_by(index_block_hash)
		.iter()
		.map(|tx| tx.tx_id())
		.collect();
	let update = writer.update_confirmations(
		&tx_ids,
		|confirmation| {
			confirmation.index_block_hash == *index_block_hash && confirmation.canonical != canonical
		},
		|confirmation| confirmation.canonical = canonical,
	);
	let miner_rewards =
		writer.update_miner_rewards(index_block_hash, |reward| reward.canonical = canonical);

	counters.txs.add(canonical, update.changed.len());
	counters.events.add(canonical, update.events);
	counters.miner_rewards.add(canonical, miner_rewards);
	tx_ids
}
