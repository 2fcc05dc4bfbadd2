use crate::cli::CliOpts;
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use serde::{Deserialize, Serialize};
use stacks_indexer_core::{
	api::configuration::APIConfig,
	chain::ChainConfig,
	types::{duration_millis_format, tracing_level_format, Network},
};
use std::{fs, time::Duration};
use tracing::Level;

/// Representation of a configuration used by this project.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RuntimeConfig {
	#[serde(flatten)]
	pub api: APIConfig,
	/// Log level, default is `INFO`. See `<https://docs.rs/log/0.4.14/log/enum.LevelFilter.html>` for possible log level values. (default: `INFO`).
	#[serde(with = "tracing_level_format")]
	pub log_level: Level,
	/// If set to true, logs are displayed in JSON format, which is used for structured logging. Otherwise, plain text format is used (default: false).
	pub log_format_json: bool,
	/// Network the node runs on, selects address versions and boot contracts (default: mainnet).
	pub network: Network,
	/// Pending mempool transactions received this many blocks ago are dropped (default: 256).
	pub mempool_gc_threshold_blocks: u64,
	/// Minimum interval between mempool statistics recomputations, in milliseconds (default: 1000).
	#[serde(with = "duration_millis_format")]
	pub mempool_stats_debounce: Duration,
	/// While the chain tip is below this height, mempool and microblock events are skipped (default: None).
	pub ibd_height: Option<u64>,
	/// Capacity of the change notification channel (default: 1024).
	pub notification_buffer_size: usize,
	/// File system path where RocksDB stores indexed chain state (default: stacks_indexer_db).
	pub db_path: String,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		let chain = ChainConfig::default();
		RuntimeConfig {
			api: Default::default(),
			log_level: Level::INFO,
			log_format_json: false,
			network: chain.network,
			mempool_gc_threshold_blocks: chain.mempool_gc_threshold_blocks,
			mempool_stats_debounce: chain.mempool_stats_debounce,
			ibd_height: chain.ibd_height,
			notification_buffer_size: 1024,
			db_path: "stacks_indexer_db".to_owned(),
		}
	}
}

impl From<&RuntimeConfig> for ChainConfig {
	fn from(val: &RuntimeConfig) -> Self {
		ChainConfig {
			network: val.network,
			mempool_gc_threshold_blocks: val.mempool_gc_threshold_blocks,
			mempool_stats_debounce: val.mempool_stats_debounce,
			ibd_height: val.ibd_height,
		}
	}
}

pub fn load_runtime_config(opts: &CliOpts) -> Result<RuntimeConfig> {
	let mut cfg = if let Some(config_path) = &opts.config {
		fs::metadata(config_path).map_err(|_| eyre!("Provided config file doesn't exist."))?;
		confy::load_path(config_path)
			.wrap_err(format!("Failed to load configuration from {config_path}"))?
	} else {
		RuntimeConfig::default()
	};

	cfg.log_format_json = opts.logs_json || cfg.log_format_json;
	cfg.log_level = opts.verbosity.unwrap_or(cfg.log_level);

	// Flags and environment override the config parameters
	if let Some(network) = opts.network {
		cfg.network = network;
	}
	if let Some(host) = &opts.http_server_host {
		cfg.api.http_server_host = host.clone();
	}
	if let Some(port) = opts.http_server_port {
		cfg.api.http_server_port = port;
	}
	if let Some(threshold) = opts.mempool_gc_threshold_blocks {
		cfg.mempool_gc_threshold_blocks = threshold;
	}
	if let Some(debounce) = opts.mempool_stats_debounce {
		cfg.mempool_stats_debounce = Duration::from_millis(debounce);
	}
	cfg.ibd_height = opts.ibd_height.or(cfg.ibd_height);
	if let Some(db_path) = &opts.db_path {
		cfg.db_path = db_path.clone();
	}

	if cfg.notification_buffer_size == 0 {
		return Err(eyre!("Notification buffer size must be greater than zero"));
	}

	Ok(cfg)
}

#[cfg(test)]
mod tests {
	use super::{load_runtime_config, RuntimeConfig};
	use crate::cli::CliOpts;
	use clap::Parser;
	use stacks_indexer_core::{chain::ChainConfig, types::Network};
	use std::time::Duration;
	use test_case::test_case;
	use tracing::Level;

	fn parse(args: &[&str]) -> CliOpts {
		CliOpts::parse_from(["stacks-indexer"].iter().chain(args))
	}

	#[test]
	fn defaults() {
		let cfg = RuntimeConfig::default();
		assert_eq!(cfg.api.http_server_host, "127.0.0.1");
		assert_eq!(cfg.api.http_server_port, 3700);
		assert_eq!(cfg.api.body_limit_bytes, 500 * 1024 * 1024);
		assert_eq!(cfg.mempool_gc_threshold_blocks, 256);
		assert_eq!(cfg.mempool_stats_debounce, Duration::from_millis(1000));
		assert_eq!(cfg.network, Network::Mainnet);
		assert_eq!(cfg.ibd_height, None);
		assert_eq!(cfg.log_level, Level::INFO);
		assert_eq!(cfg.db_path, "stacks_indexer_db");
	}

	#[test]
	fn flags_override_defaults() {
		let opts = parse(&[
			"--network",
			"testnet",
			"--http-server-port",
			"4000",
			"--mempool-stats-debounce",
			"250",
			"--ibd-height",
			"120",
			"--verbosity",
			"debug",
			"--logs-json",
			"--db-path",
			"/var/lib/stacks-indexer",
			"--clean",
		]);
		let cfg = load_runtime_config(&opts).unwrap();

		assert_eq!(cfg.network, Network::Testnet);
		assert_eq!(cfg.api.http_server_port, 4000);
		assert_eq!(cfg.log_level, Level::DEBUG);
		assert!(cfg.log_format_json);
		assert_eq!(cfg.db_path, "/var/lib/stacks-indexer");
		assert!(opts.clean);

		let chain = ChainConfig::from(&cfg);
		assert_eq!(chain.mempool_stats_debounce, Duration::from_millis(250));
		assert_eq!(chain.ibd_height, Some(120));
		assert_eq!(chain.network, Network::Testnet);
	}

	#[test_case(&["--config", "/nonexistent/stacks-indexer.toml"] ; "missing config file")]
	#[test_case(&["--http-server-port", "70000"] ; "port out of range")]
	fn invalid_options(args: &[&str]) {
		let result = CliOpts::try_parse_from(["stacks-indexer"].iter().chain(args))
			.map_err(|error| error.to_string())
			.and_then(|opts| load_runtime_config(&opts).map_err(|error| error.to_string()));
		assert!(result.is_err());
	}
}
