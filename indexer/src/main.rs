use crate::{
	cli::CliOpts,
	config::{load_runtime_config, RuntimeConfig},
};
use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
#[cfg(feature = "rocksdb")]
use stacks_indexer_core::data::RocksDB;
use stacks_indexer_core::{
	api,
	chain::{ChainConfig, ChainEngine},
	data::MemoryStore,
	notifications::{ChangeNotification, Notifier},
	sequencer::{IngestHandle, Sequencer},
	shutdown::{Controller, Monitor},
	utils::{default_subscriber, install_panic_hooks, json_subscriber, spawn_in_span},
};
use std::{fs, path::Path, sync::Arc};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, trace, warn};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod cli;
mod config;

/// Stacks chain event indexer

#[cfg(feature = "rocksdb")]
fn open_store(cfg: &RuntimeConfig) -> Result<MemoryStore> {
	let db = RocksDB::open(&cfg.db_path).wrap_err("Stacks indexer could not initialize database")?;
	let store = MemoryStore::open(Arc::new(db)).wrap_err("Failed to load chain state")?;
	Ok(store)
}

#[cfg(not(feature = "rocksdb"))]
fn open_store(_: &RuntimeConfig) -> Result<MemoryStore> {
	warn!("Built without rocksdb, chain state is kept in memory only");
	Ok(MemoryStore::default())
}

fn run(cfg: RuntimeConfig, clean: bool, shutdown: &Controller) -> Result<Arc<ChainEngine>> {
	let version = clap::crate_version!();
	info!("Running Stacks indexer version: {version}.");
	info!("Using config: {cfg:?}");

	if clean && Path::new(&cfg.db_path).exists() {
		info!("Cleaning up local state directory");
		fs::remove_dir_all(&cfg.db_path).wrap_err("Failed to remove local state directory")?;
	}

	let notifier = Notifier::new(cfg.notification_buffer_size);
	let engine = Arc::new(ChainEngine::new(
		open_store(&cfg)?,
		notifier.clone(),
		ChainConfig::from(&cfg),
	));

	let (sequencer, sequencer_loop) = Sequencer::new(shutdown.watch());
	spawn_in_span(sequencer_loop.run());

	spawn_in_span(log_notifications(notifier.subscribe(), shutdown.watch()));

	let server = api::server::Server {
		handle: IngestHandle::new(engine.clone(), sequencer),
		shutdown: shutdown.watch(),
	};
	spawn_in_span(server.bind(cfg.api)?);

	Ok(engine)
}

/// Traces change notifications until shutdown.
async fn log_notifications(mut receiver: broadcast::Receiver<ChangeNotification>, shutdown: Monitor) {
	loop {
		let notification = tokio::select! {
			notification = receiver.recv() => notification,
			_ = shutdown.canceled() => break,
		};
		match notification {
			Ok(notification) => trace!(?notification, "Change notification"),
			Err(RecvError::Lagged(skipped)) => warn!(skipped, "Change notifications skipped"),
			Err(RecvError::Closed) => break,
		}
	}
}

#[tokio::main]
pub async fn main() -> Result<()> {
	let mut shutdown = Controller::new();
	let opts = CliOpts::parse();
	let cfg = load_runtime_config(&opts)?;

	if cfg.log_format_json {
		tracing::subscriber::set_global_default(json_subscriber(cfg.log_level))?;
	} else {
		tracing::subscriber::set_global_default(default_subscriber(cfg.log_level))?;
	};

	// install custom panic hooks
	install_panic_hooks(shutdown.trigger())?;

	// watch for termination signals from user to trigger the shutdown
	spawn_in_span(shutdown.trigger().on_user_signal());

	let engine = match run(cfg, opts.clean, &shutdown) {
		Ok(engine) => engine,
		Err(error) => {
			error!("{error:#}");
			shutdown.trigger().trigger_shutdown("Startup failed");
			shutdown.shutdown().await;
			return Err(error.wrap_err("Starting Stacks indexer failed"));
		},
	};

	shutdown.triggered().await;
	shutdown.shutdown().await;
	engine.close();
	info!("Stacks indexer stopped");
	Ok(())
}
