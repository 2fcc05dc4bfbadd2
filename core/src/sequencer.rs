//! Ingestion sequencer.
//!
//! Event observer requests arrive concurrently, but the chain engine must see
//! them one at a time and in arrival order. Every request is queued as a job
//! on a single worker loop, and the submitter waits for the job's result.

use crate::{
	chain::{BlockOutcome, ChainEngine, MicroblockOutcome},
	error::IngestError,
	normalizer::{
		self,
		messages::{
			CoreNodeBlockMessage, CoreNodeBurnBlockMessage, CoreNodeDropMempoolTxMessage,
			CoreNodeMicroblockMessage,
		},
	},
	shutdown::Monitor,
	types::{ChainTip, H256},
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{
	mpsc::{self, UnboundedReceiver, UnboundedSender},
	oneshot,
};
use tracing::{debug, error, info, warn, Span};

struct Job {
	name: &'static str,
	span: Span,
	work: Box<dyn FnOnce() + Send>,
}

/// Submits jobs to the [`SequencerLoop`].
#[derive(Clone)]
pub struct Sequencer {
	sender: UnboundedSender<Job>,
}

impl Sequencer {
	pub fn new(shutdown: Monitor) -> (Self, SequencerLoop) {
		let (sender, receiver) = mpsc::unbounded_channel();
		(Sequencer { sender }, SequencerLoop { receiver, shutdown })
	}

	/// Runs `work` after every previously submitted job has completed.
	pub async fn submit<T, F>(&self, name: &'static str, work: F) -> Result<T, IngestError>
	where
		F: FnOnce() -> Result<T, IngestError> + Send + 'static,
		T: Send + 'static,
	{
		let (response_sender, response_receiver) = oneshot::channel();
		let job = Job {
			name,
			span: Span::current(),
			work: Box::new(move || {
				// submitter may have gone away
				let _ = response_sender.send(work());
			}),
		};
		self.sender
			.send(job)
			.map_err(|_| IngestError::QueueClosed)?;
		response_receiver
			.await
			.map_err(|_| IngestError::WorkerFailed(name))?
	}
}

/// Single worker applying queued jobs in order.
pub struct SequencerLoop {
	receiver: UnboundedReceiver<Job>,
	shutdown: Monitor,
}

impl SequencerLoop {
	/// Runs until shutdown is triggered. A job in flight is always completed.
	pub async fn run(mut self) {
		loop {
			let job = tokio::select! {
				job = self.receiver.recv() => match job {
					Some(job) => job,
					None => {
						warn!("Ingestion queue closed, exiting the sequencer loop");
						break;
					},
				},
				_ = self.shutdown.canceled() => {
					info!("Shutdown triggered, exiting the sequencer loop");
					break;
				},
			};

			let Job { name, span, work } = job;
			let result = tokio::task::spawn_blocking(move || span.in_scope(work)).await;
			if let Err(error) = result {
				error!(job = name, %error, "Ingestion job failed");
			}
		}

		// queued jobs resolve with a worker failure
		self.receiver.close();
	}
}

fn log_failure(kind: &'static str, error: &IngestError) {
	match error {
		IngestError::Malformed(error) => warn!(kind, %error, "Rejected malformed event"),
		IngestError::Chain(error) => error!(kind, %error, "Failed to apply event"),
		IngestError::WorkerFailed(_) | IngestError::QueueClosed => {
			error!(kind, %error, "Event was not processed")
		},
	}
}

/// Entry point for event observer payloads.
///
/// Payloads are normalized and applied on the sequencer, so malformed input is
/// rejected without touching the store.
#[derive(Clone)]
pub struct IngestHandle {
	engine: Arc<ChainEngine>,
	sequencer: Sequencer,
}

impl IngestHandle {
	pub fn new(engine: Arc<ChainEngine>, sequencer: Sequencer) -> Self {
		IngestHandle { engine, sequencer }
	}

	pub fn is_ibd(&self) -> bool {
		self.engine.is_ibd()
	}

	pub fn chain_tip(&self) -> ChainTip {
		self.engine.chain_tip()
	}

	async fn run<T, F>(&self, kind: &'static str, work: F) -> Result<T, IngestError>
	where
		F: FnOnce(&ChainEngine) -> Result<T, IngestError> + Send + 'static,
		T: Send + 'static,
	{
		let engine = self.engine.clone();
		let result = self.sequencer.submit(kind, move || work(&engine)).await;
		if let Err(error) = &result {
			log_failure(kind, error);
		}
		result
	}

	pub async fn new_block(&self, message: CoreNodeBlockMessage) -> Result<BlockOutcome, IngestError> {
		self.run("new_block", move |engine| {
			let update = normalizer::parse_block_message(&message, engine.network())?;
			Ok(engine.apply_block(update)?)
		})
		.await
	}

	pub async fn new_microblocks(
		&self,
		message: CoreNodeMicroblockMessage,
	) -> Result<MicroblockOutcome, IngestError> {
		self.run("new_microblocks", move |engine| {
			let update = normalizer::parse_microblocks_message(&message, engine.network())?;
			Ok(engine.apply_microblocks(update)?)
		})
		.await
	}

	pub async fn new_burn_block(&self, message: CoreNodeBurnBlockMessage) -> Result<(), IngestError> {
		self.run("new_burn_block", move |engine| {
			Ok(engine.apply_burn_block(normalizer::parse_burn_block_message(&message))?)
		})
		.await
	}

	pub async fn new_mempool_txs(&self, raw_txs: Vec<String>) -> Result<Vec<H256>, IngestError> {
		let receipt_time = Utc::now().timestamp();
		self.run("new_mempool_tx", move |engine| {
			let txs = normalizer::parse_mempool_txs(&raw_txs, receipt_time)?;
			let inserted = engine.apply_mempool_txs(txs)?;
			debug!(received = raw_txs.len(), inserted = inserted.len(), "Mempool transactions applied");
			Ok(inserted)
		})
		.await
	}

	pub async fn drop_mempool_txs(
		&self,
		message: CoreNodeDropMempoolTxMessage,
	) -> Result<Vec<H256>, IngestError> {
		self.run("drop_mempool_tx", move |engine| {
			let request = normalizer::parse_drop_mempool_message(&message)?;
			Ok(engine.drop_mempool_txs(request)?)
		})
		.await
	}
}

#[cfg(test)]
mod tests {
	use super::{IngestHandle, Sequencer};
	use crate::{
		chain::{BlockOutcome, ChainConfig, ChainEngine},
		data::{ChainStore, MemoryStore},
		error::IngestError,
		fixtures::{self, h},
		notifications::Notifier,
		shutdown::Controller,
	};
	use futures::future::join_all;
	use std::sync::{Arc, Mutex};

	fn handle(shutdown: &Controller) -> IngestHandle {
		let (sequencer, worker) = Sequencer::new(shutdown.watch());
		tokio::spawn(worker.run());
		let engine = ChainEngine::new(MemoryStore::default(), Notifier::new(64), ChainConfig::default());
		IngestHandle::new(Arc::new(engine), sequencer)
	}

	#[tokio::test]
	async fn jobs_complete_in_submission_order() {
		let shutdown = Controller::new();
		let (sequencer, worker) = Sequencer::new(shutdown.watch());
		tokio::spawn(worker.run());

		let applied = Arc::new(Mutex::new(vec![]));
		let jobs = (0..16).map(|n| {
			let applied = applied.clone();
			sequencer.submit("test", move || {
				applied.lock().expect("Lock acquired").push(n);
				Ok(n)
			})
		});
		let results: Vec<usize> = join_all(jobs)
			.await
			.into_iter()
			.collect::<Result<_, _>>()
			.unwrap();

		assert_eq!(results, (0..16).collect::<Vec<_>>());
		assert_eq!(*applied.lock().unwrap(), (0..16).collect::<Vec<_>>());
	}

	#[tokio::test]
	async fn panicking_job_does_not_stop_the_worker() {
		let shutdown = Controller::new();
		let (sequencer, worker) = Sequencer::new(shutdown.watch());
		tokio::spawn(worker.run());

		let failed = sequencer
			.submit::<(), _>("panics", || panic!("job panicked"))
			.await;
		assert!(matches!(failed, Err(IngestError::WorkerFailed("panics"))));
		assert_eq!(sequencer.submit("next", || Ok(1)).await.unwrap(), 1);
	}

	#[tokio::test]
	async fn panic_mid_write_leaves_store_usable() {
		let shutdown = Controller::new();
		let handle = handle(&shutdown);

		let failed = handle
			.run::<(), _>("panics", |engine| {
				let mut writer = engine.store().begin();
				writer.insert_block(fixtures::block("b1", 1, None));
				panic!("job panicked mid write");
			})
			.await;
		assert!(matches!(failed, Err(IngestError::WorkerFailed("panics"))));
		assert!(handle.engine.store().read().block(&h("index-b1")).is_none());

		let message = fixtures::block_message("b1", 1, None, vec![fixtures::coinbase_tx(1, 0)]);
		let outcome = handle.new_block(message).await.unwrap();
		assert!(matches!(outcome, BlockOutcome::Applied { canonical: true, .. }));
		assert_eq!(handle.chain_tip().block_height, 1);
	}

	#[tokio::test]
	async fn submit_after_shutdown_fails() {
		let mut shutdown = Controller::new();
		let (sequencer, worker) = Sequencer::new(shutdown.watch());
		let worker = tokio::spawn(worker.run());

		shutdown.shutdown().await;
		worker.await.unwrap();

		let result = sequencer.submit("late", || Ok(())).await;
		assert!(matches!(result, Err(IngestError::QueueClosed)));
	}

	#[tokio::test]
	async fn blocks_are_applied_through_the_queue() {
		let shutdown = Controller::new();
		let handle = handle(&shutdown);

		let message = fixtures::block_message("b1", 1, None, vec![fixtures::coinbase_tx(1, 0)]);
		let outcome = handle.new_block(message.clone()).await.unwrap();
		assert!(matches!(outcome, BlockOutcome::Applied { canonical: true, .. }));
		assert_eq!(handle.new_block(message).await.unwrap(), BlockOutcome::Duplicate);

		let tip = handle.chain_tip();
		assert_eq!(tip.block_height, 1);
		assert_eq!(tip.index_block_hash, h("index-b1"));
	}

	#[tokio::test]
	async fn malformed_block_is_rejected_without_writes() {
		let shutdown = Controller::new();
		let handle = handle(&shutdown);

		let mut tx = fixtures::coinbase_tx(1, 0);
		tx.raw_tx = "0xzz".to_string();
		let message = fixtures::block_message("b1", 1, None, vec![tx]);

		let result = handle.new_block(message).await;
		assert!(matches!(result, Err(IngestError::Malformed(_))));
		assert!(handle.engine.store().read().block(&h("index-b1")).is_none());
	}

	#[tokio::test]
	async fn mempool_txs_are_inserted_once() {
		let shutdown = Controller::new();
		let handle = handle(&shutdown);

		let raw = format!("0x{}", hex::encode(fixtures::transfer_raw(1, 0)));
		let inserted = handle.new_mempool_txs(vec![raw.clone()]).await.unwrap();
		assert_eq!(inserted.len(), 1);
		assert!(handle.new_mempool_txs(vec![raw]).await.unwrap().is_empty());
		assert_eq!(handle.chain_tip().mempool_tx_count, 1);
	}
}
