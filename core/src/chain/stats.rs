//! Mempool fee and size statistics, recomputed at most once per debounce interval.

use crate::{
	data::{ChainStore, MemoryStore},
	notifications::{ChangeNotification, Notifier},
	types::{MempoolTx, TxType},
};
use serde::Serialize;
use std::{
	collections::BTreeMap,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{trace, Instrument};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Percentiles {
	pub p25: f64,
	pub p50: f64,
	pub p75: f64,
	pub p95: f64,
}

/// Continuous percentile with linear interpolation between closest ranks.
fn percentile(sorted: &[f64], fraction: f64) -> f64 {
	let position = fraction * (sorted.len() - 1) as f64;
	let lower = position.floor() as usize;
	let upper = position.ceil() as usize;
	sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

impl Percentiles {
	fn of(mut values: Vec<f64>) -> Option<Self> {
		if values.is_empty() {
			return None;
		}
		values.sort_by(f64::total_cmp);
		Some(Percentiles {
			p25: percentile(&values, 0.25),
			p50: percentile(&values, 0.50),
			p75: percentile(&values, 0.75),
			p95: percentile(&values, 0.95),
		})
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MempoolStats {
	pub tx_type_counts: BTreeMap<TxType, u64>,
	pub tx_fee_rates: BTreeMap<TxType, Percentiles>,
	pub tx_byte_sizes: BTreeMap<TxType, Percentiles>,
}

impl MempoolStats {
	/// Statistics over pending transactions.
	pub fn compute(pending: &[MempoolTx]) -> Self {
		let mut by_type: BTreeMap<TxType, Vec<&MempoolTx>> = BTreeMap::new();
		for tx in pending.iter().filter(|tx| !tx.pruned) {
			by_type.entry(tx.body.tx_type).or_default().push(tx);
		}

		let mut stats = MempoolStats::default();
		for (tx_type, txs) in by_type {
			stats.tx_type_counts.insert(tx_type, txs.len() as u64);
			let fee_rates = txs.iter().map(|tx| tx.body.fee_rate as f64).collect();
			let byte_sizes = txs.iter().map(|tx| tx.body.byte_size() as f64).collect();
			if let Some(fee_rates) = Percentiles::of(fee_rates) {
				stats.tx_fee_rates.insert(tx_type, fee_rates);
			}
			if let Some(byte_sizes) = Percentiles::of(byte_sizes) {
				stats.tx_byte_sizes.insert(tx_type, byte_sizes);
			}
		}
		stats
	}
}

fn publish(store: &MemoryStore, notifier: &Notifier) {
	let stats = MempoolStats::compute(&store.read().pending_mempool_txs());
	trace!(tx_types = stats.tx_type_counts.len(), "Publishing mempool stats");
	notifier.publish([ChangeNotification::MempoolStats(stats)]);
}

/// Coalesces mempool stats requests into one recomputation per interval.
///
/// Without a tokio runtime, statistics are recomputed on every request.
pub struct MempoolStatsScheduler {
	store: MemoryStore,
	notifier: Notifier,
	debounce: Duration,
	pending: Arc<AtomicBool>,
	task: Mutex<Option<JoinHandle<()>>>,
	runtime: Option<Handle>,
}

impl MempoolStatsScheduler {
	pub fn new(store: MemoryStore, notifier: Notifier, debounce: Duration) -> Self {
		MempoolStatsScheduler {
			store,
			notifier,
			debounce,
			pending: Arc::new(AtomicBool::new(false)),
			task: Mutex::new(None),
			runtime: Handle::try_current().ok(),
		}
	}

	pub fn schedule(&self) {
		let Some(runtime) = &self.runtime else {
			publish(&self.store, &self.notifier);
			return;
		};
		if self.pending.swap(true, Ordering::SeqCst) {
			trace!("Mempool stats already scheduled");
			return;
		}

		let store = self.store.clone();
		let notifier = self.notifier.clone();
		let pending = self.pending.clone();
		let debounce = self.debounce;
		let task = runtime.spawn(
			async move {
				tokio::time::sleep(debounce).await;
				pending.store(false, Ordering::SeqCst);
				publish(&store, &notifier);
			}
			.in_current_span(),
		);
		*self.task.lock().expect("Lock acquired") = Some(task);
	}

	/// Cancels a pending recomputation.
	pub fn close(&self) {
		if let Some(task) = self.task.lock().expect("Lock acquired").take() {
			task.abort();
		}
		self.pending.store(false, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	use super::{MempoolStats, MempoolStatsScheduler, Percentiles};
	use crate::{
		data::MemoryStore,
		fixtures::{self, h},
		mempool,
		notifications::{ChangeNotification, Notifier},
		types::TxType,
	};
	use std::time::Duration;

	#[test]
	fn percentiles_interpolate() {
		let percentiles = Percentiles::of(vec![40.0, 10.0, 30.0, 20.0]).unwrap();
		assert_eq!(percentiles.p25, 17.5);
		assert_eq!(percentiles.p50, 25.0);
		assert_eq!(percentiles.p75, 32.5);
		assert_eq!(Percentiles::of(vec![]), None);
	}

	#[test]
	fn stats_skip_pruned_rows() {
		let mut pruned = fixtures::mempool_tx(h("b"), 0);
		pruned.pruned = true;
		let stats = MempoolStats::compute(&[fixtures::mempool_tx(h("a"), 0), pruned]);

		assert_eq!(stats.tx_type_counts.get(&TxType::TokenTransfer), Some(&1));
		assert_eq!(stats.tx_fee_rates[&TxType::TokenTransfer].p50, 180.0);
	}

	#[tokio::test(start_paused = true)]
	async fn requests_are_debounced() {
		let store = MemoryStore::default();
		let notifier = Notifier::new(16);
		let mut receiver = notifier.subscribe();
		let scheduler = MempoolStatsScheduler::new(store.clone(), notifier, Duration::from_secs(1));

		{
			let mut writer = store.begin();
			mempool::insert(&mut writer, vec![fixtures::mempool_tx(h("a"), 0)]);
			writer.commit().unwrap();
		}
		scheduler.schedule();
		scheduler.schedule();
		scheduler.schedule();

		let Ok(ChangeNotification::MempoolStats(stats)) = receiver.recv().await else {
			panic!("expected mempool stats");
		};
		assert_eq!(stats.tx_type_counts.get(&TxType::TokenTransfer), Some(&1));
		tokio::time::sleep(Duration::from_secs(5)).await;
		assert!(receiver.try_recv().is_err());
	}

	#[tokio::test(start_paused = true)]
	async fn close_cancels_pending_run() {
		let notifier = Notifier::new(16);
		let mut receiver = notifier.subscribe();
		let scheduler = MempoolStatsScheduler::new(MemoryStore::default(), notifier, Duration::from_secs(1));

		scheduler.schedule();
		scheduler.close();
		tokio::time::sleep(Duration::from_secs(5)).await;
		assert!(receiver.try_recv().is_err());
	}
}
