use super::ReorgCounters;
use crate::{
	data::{ChainStore, StoreWriter},
	error::{ChainError, MicroblockGap},
	types::{Block, Microblock, H256},
};
use itertools::Itertools;
use std::collections::HashSet;
use tracing::trace;

/// Block a microblock stream is resolved against. All zero while unconfirmed.
#[derive(Clone, Copy, Debug, Default)]
pub struct Anchor {
	pub index_block_hash: H256,
	pub block_hash: H256,
	pub block_height: u64,
	pub burn_block_time: i64,
}

impl Anchor {
	pub fn of(block: &Block) -> Self {
		Anchor {
			index_block_hash: block.index_block_hash,
			block_hash: block.block_hash,
			block_height: block.block_height,
			burn_block_time: block.burn_block_time,
		}
	}

	pub fn unconfirmed() -> Self {
		Anchor::default()
	}
}

#[derive(Debug, PartialEq, Eq)]
pub enum MicroblockWalk {
	/// Stream from sequence 0 up to the tip, and every other candidate.
	Resolved {
		accepted: Vec<Microblock>,
		orphaned: Vec<Microblock>,
	},
	Gap(MicroblockGap),
}

/// Walks parent links from `tip` back to sequence 0.
///
/// Candidates are selected by parent block and by height, since canonical
/// flags are not reliable while a reorg is being resolved. Returns `None` if
/// `tip` is not among them.
pub fn find_unanchored_microblocks_at_chain_tip<S: ChainStore + ?Sized>(
	store: &S,
	parent_index_block_hash: &H256,
	block_height: u64,
	tip: &H256,
) -> Option<MicroblockWalk> {
	let candidates: Vec<Microblock> = store
		.microblocks_by_parent(parent_index_block_hash)
		.into_iter()
		.chain(store.microblocks_at_height(block_height))
		.unique_by(|microblock| microblock.microblock_hash)
		.collect();

	let mut current = candidates
		.iter()
		.find(|microblock| microblock.microblock_hash == *tip)?;
	let mut visited = HashSet::from([current.microblock_hash]);
	let mut accepted = vec![current.clone()];

	while let Some(parent) = candidates.iter().find(|microblock| {
		microblock.microblock_hash == current.microblock_parent_hash
			&& !visited.contains(&microblock.microblock_hash)
	}) {
		visited.insert(parent.microblock_hash);
		accepted.push(parent.clone());
		current = parent;
	}

	if current.microblock_sequence != 0 {
		return Some(MicroblockWalk::Gap(MicroblockGap {
			missing_microblock_hash: current.microblock_parent_hash,
			oldest_microblock_hash: current.microblock_hash,
			oldest_microblock_sequence: current.microblock_sequence,
		}));
	}

	accepted.reverse();
	let orphaned = candidates
		.into_iter()
		.filter(|microblock| !visited.contains(&microblock.microblock_hash))
		.collect();
	Some(MicroblockWalk::Resolved { accepted, orphaned })
}

/// Transactions whose microblock confirmation was resolved by an anchor block.
#[derive(Debug, Default)]
pub struct MicroblockResolution {
	pub accepted_txs: Vec<H256>,
	pub orphaned_txs: Vec<H256>,
}

/// Resolves which microblocks of the parent stream `block` confirms.
pub fn update_micro_canonical(
	writer: &mut StoreWriter,
	block: &Block,
	canonical: bool,
	counters: &mut ReorgCounters,
) -> Result<MicroblockResolution, ChainError> {
	let (accepted, orphaned) = if block.parent_microblock_hash.is_zero() {
		if block.parent_microblock_sequence != 0 {
			return Err(ChainError::InvalidParentMicroblockSequence {
				index_block_hash: block.index_block_hash,
				sequence: block.parent_microblock_sequence,
			});
		}
		// confirms no microblocks, so every candidate is orphaned
		let orphaned = writer
			.microblocks_by_parent(&block.parent_index_block_hash)
			.into_iter()
			.chain(writer.microblocks_at_height(block.block_height))
			.unique_by(|microblock| microblock.microblock_hash)
			.collect();
		(vec![], orphaned)
	} else {
		let walk = find_unanchored_microblocks_at_chain_tip(
			&**writer,
			&block.parent_index_block_hash,
			block.block_height,
			&block.parent_microblock_hash,
		);
		match walk {
			Some(MicroblockWalk::Resolved { accepted, orphaned }) => (accepted, orphaned),
			Some(MicroblockWalk::Gap(gap)) => {
				return Err(ChainError::UnresolvedMicroblockGap {
					index_block_hash: block.index_block_hash,
					gap,
				})
			},
			None => {
				return Err(ChainError::MissingParentMicroblock {
					microblock_hash: block.parent_microblock_hash,
					parent_index_block_hash: block.parent_index_block_hash,
				})
			},
		}
	};

	trace!(
		index_block_hash = %block.index_block_hash,
		accepted = accepted.len(),
		orphaned = orphaned.len(),
		"Resolved parent microblock stream"
	);

	let anchor = Anchor::of(block);
	let orphaned_txs = handle_micro_reorg(writer, canonical, false, &anchor, &orphaned, counters)?;
	let accepted_txs = handle_micro_reorg(writer, canonical, true, &anchor, &accepted, counters)?;
	Ok(MicroblockResolution {
		accepted_txs,
		orphaned_txs,
	})
}

/// Sets canonical flags and anchor linkage on microblocks and their transactions.
///
/// Only transactions still unconfirmed, or already confirmed by `anchor`, are
/// touched. A sibling anchor block may confirm the same microblock with rows
/// of its own. Returns the transactions matched.
pub fn handle_micro_reorg(
	writer: &mut StoreWriter,
	canonical: bool,
	microblock_canonical: bool,
	anchor: &Anchor,
	microblocks: &[Microblock],
	counters: &mut ReorgCounters,
) -> Result<Vec<H256>, ChainError> {
	if microblocks.is_empty() {
		return Ok(vec![]);
	}
	let hashes: Vec<H256> = microblocks
		.iter()
		.map(|microblock| microblock.microblock_hash)
		.collect();

	let updated = writer.update_microblocks(&hashes, |microblock| {
		microblock.canonical = canonical;
		microblock.microblock_canonical = microblock_canonical;
		microblock.index_block_hash = anchor.index_block_hash;
		microblock.block_hash = anchor.block_hash;
	});
	if updated != hashes.len() {
		return Err(ChainError::RowCountMismatch {
			table: "microblocks",
			expected: hashes.len(),
			actual: updated,
		});
	}

	let tx_ids: Vec<H256> = hashes
		.iter()
		.flat_map(|hash| writer.txs_in_microblock(hash))
		.map(|tx| tx.tx_id())
		.unique()
		.collect();
	let update = writer.update_confirmations(
		&tx_ids,
		|confirmation| {
			hashes.contains(&confirmation.microblock_hash)
				&& (confirmation.index_block_hash == anchor.index_block_hash
					|| confirmation.index_block_hash.is_zero())
		},
		|confirmation| {
			confirmation.canonical = canonical;
			confirmation.microblock_canonical = microblock_canonical;
			confirmation.index_block_hash = anchor.index_block_hash;
			confirmation.block_hash = anchor.block_hash;
			if !anchor.index_block_hash.is_zero() {
				confirmation.block_height = anchor.block_height;
				confirmation.burn_block_time = anchor.burn_block_time;
			}
		},
	);

	let visible = canonical && microblock_canonical;
	counters.microblocks.add(visible, updated);
	counters.txs.add(visible, update.changed.len());
	counters.events.add(visible, update.events);
	Ok(update.matched)
}

#[cfg(test)]
mod tests {
	use super::{find_unanchored_microblocks_at_chain_tip, MicroblockWalk};
	use crate::{
		data::MemoryStore,
		error::MicroblockGap,
		fixtures::{self, h},
		types::Microblock,
	};

	fn stored(microblocks: &[&Microblock]) -> MemoryStore {
		let store = MemoryStore::default();
		let mut writer = store.begin();
		for microblock in microblocks {
			writer.insert_microblock(Microblock {
				block_height: 2,
				..(*microblock).clone()
			});
		}
		writer.commit().unwrap();
		store
	}

	fn hashes(microblocks: &[Microblock]) -> Vec<String> {
		microblocks
			.iter()
			.map(|microblock| microblock.microblock_hash.to_string())
			.collect()
	}

	#[test]
	fn walk_accepts_stream_and_orphans_forks() {
		let mb0 = fixtures::microblock("mb-0", 0, h("b1"), "b1");
		let mb1 = fixtures::microblock("mb-1", 1, h("mb-0"), "b1");
		let fork = fixtures::microblock("mb-1-fork", 1, h("mb-0"), "b1");
		let mb2 = fixtures::microblock("mb-2", 2, h("mb-1"), "b1");
		let store = stored(&[&mb0, &mb1, &fork, &mb2]);

		let walk = find_unanchored_microblocks_at_chain_tip(&*store.read(), &h("index-b1"), 2, &h("mb-2"));

		let Some(MicroblockWalk::Resolved { accepted, orphaned }) = walk else {
			panic!("expected resolved walk, got {walk:?}");
		};
		assert_eq!(
			hashes(&accepted),
			vec![h("mb-0").to_string(), h("mb-1").to_string(), h("mb-2").to_string()]
		);
		assert_eq!(hashes(&orphaned), vec![h("mb-1-fork").to_string()]);
	}

	#[test]
	fn walk_reports_gap() {
		let mb0 = fixtures::microblock("mb-0", 0, h("b1"), "b1");
		let mb2 = fixtures::microblock("mb-2", 2, h("mb-1"), "b1");
		let store = stored(&[&mb0, &mb2]);

		let walk = find_unanchored_microblocks_at_chain_tip(&*store.read(), &h("index-b1"), 2, &h("mb-2"));

		assert_eq!(
			walk,
			Some(MicroblockWalk::Gap(MicroblockGap {
				missing_microblock_hash: h("mb-1"),
				oldest_microblock_hash: h("mb-2"),
				oldest_microblock_sequence: 2,
			}))
		);
	}

	#[test]
	fn walk_from_unknown_tip() {
		let store = stored(&[&fixtures::microblock("mb-0", 0, h("b1"), "b1")]);
		assert_eq!(
			find_unanchored_microblocks_at_chain_tip(&*store.read(), &h("index-b1"), 2, &h("other")),
			None
		);
	}

	#[test]
	fn self_orphaned_sequence_is_disambiguated_by_parent_links() {
		// leader restarts its stream reusing sequence 1
		let mb0 = fixtures::microblock("mb-0", 0, h("b1"), "b1");
		let first = fixtures::microblock("mb-1a", 1, h("mb-0"), "b1");
		let second = fixtures::microblock("mb-1b", 1, h("mb-0"), "b1");
		let mb2 = fixtures::microblock("mb-2", 2, h("mb-1b"), "b1");
		let store = stored(&[&mb0, &first, &second, &mb2]);

		let walk = find_unanchored_microblocks_at_chain_tip(&*store.read(), &h("index-b1"), 2, &h("mb-2"));

		let Some(MicroblockWalk::Resolved { accepted, orphaned }) = walk else {
			panic!("expected resolved walk, got {walk:?}");
		};
		assert_eq!(accepted.len(), 3);
		assert_eq!(accepted[1].microblock_hash, h("mb-1b"));
		assert_eq!(hashes(&orphaned), vec![h("mb-1a").to_string()]);
	}
}
