//! Mempool lifecycle.
//!
//! Rows are never deleted. A transaction leaves the pending set (`pruned`)
//! once it is confirmed on the canonical chain, dropped by the node or
//! garbage collected, and comes back when its confirmation is orphaned.

use crate::{
	data::{ChainStore, StoreWriter},
	types::{MempoolTx, TxStatus, H256},
};
use chrono::Utc;
use tracing::{debug, trace};

/// Inserts transactions not already in the mempool, received at the current tip.
pub fn insert(writer: &mut StoreWriter, txs: Vec<MempoolTx>) -> Vec<H256> {
	let receipt_block_height = writer.chain_tip().block_height;
	let inserted: Vec<H256> = txs
		.into_iter()
		.filter_map(|mut tx| {
			let tx_id = tx.tx_id;
			tx.receipt_block_height = receipt_block_height;
			writer.insert_mempool_tx(tx).then_some(tx_id)
		})
		.collect();
	// a late broadcast of an already mined transaction must not stay pending
	reconcile(writer);
	inserted
}

/// Removes confirmed transactions from the pending set.
pub fn prune(writer: &mut StoreWriter, tx_ids: &[H256]) -> usize {
	let pruned = writer.update_mempool_txs(tx_ids, |tx| !tx.pruned, |tx| tx.pruned = true);
	trace!(pruned = pruned.len(), "Pruned mempool transactions");
	pruned.len()
}

/// Puts orphaned transactions back into the pending set.
///
/// Transactions that never went through the mempool get a row rebuilt from
/// their latest stored confirmation.
pub fn restore(writer: &mut StoreWriter, tx_ids: &[H256]) -> usize {
	let restored = writer.update_mempool_txs(tx_ids, |tx| tx.pruned, |tx| tx.pruned = false);

	let tip = writer.chain_tip();
	let receipt_time = Utc::now().timestamp();
	let mut inserted = 0;
	for tx_id in tx_ids {
		if writer.mempool_tx(tx_id).is_some() {
			continue;
		}
		let Some(latest) = writer
			.txs(tx_id)
			.into_iter()
			.max_by_key(|tx| tx.confirmation.block_height)
		else {
			debug!(%tx_id, "No stored transaction to restore into mempool");
			continue;
		};
		let tx = MempoolTx {
			tx_id: *tx_id,
			body: latest.data.body,
			receipt_time,
			receipt_block_height: tip.block_height,
			pruned: false,
			status: TxStatus::Pending,
		};
		if writer.insert_mempool_tx(tx) {
			inserted += 1;
		}
	}

	trace!(restored = restored.len(), inserted, "Restored mempool transactions");
	restored.len() + inserted
}

/// Drops pending transactions received `threshold_blocks` or more blocks ago.
pub fn garbage_collect(writer: &mut StoreWriter, threshold_blocks: u64) -> Vec<H256> {
	let Some(cutoff) = writer.chain_tip().block_height.checked_sub(threshold_blocks) else {
		return vec![];
	};
	let stale: Vec<H256> = writer
		.pending_mempool_txs()
		.iter()
		.filter(|tx| tx.receipt_block_height <= cutoff)
		.map(|tx| tx.tx_id)
		.collect();

	writer.update_mempool_txs(
		&stale,
		|tx| !tx.pruned,
		|tx| {
			tx.pruned = true;
			tx.status = TxStatus::DroppedApiGarbageCollect;
		},
	)
}

/// Drops pending transactions the node reported as evicted.
pub fn drop_explicit(writer: &mut StoreWriter, tx_ids: &[H256], status: TxStatus) -> Vec<H256> {
	writer.update_mempool_txs(
		tx_ids,
		|tx| !tx.pruned,
		|tx| {
			tx.pruned = true;
			tx.status = status;
		},
	)
}

/// Prunes pending transactions that are already confirmed on the canonical chain.
pub fn reconcile(writer: &mut StoreWriter) -> usize {
	let confirmed: Vec<H256> = writer
		.pending_mempool_txs()
		.iter()
		.map(|tx| tx.tx_id)
		.filter(|tx_id| {
			writer
				.txs(tx_id)
				.iter()
				.any(|tx| tx.confirmation.is_confirmed())
		})
		.collect();
	if confirmed.is_empty() {
		return 0;
	}
	prune(writer, &confirmed)
}
