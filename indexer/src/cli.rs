use clap::{command, Parser};
use stacks_indexer_core::types::Network;
use tracing::Level;

#[derive(Parser)]
#[command(version)]
pub struct CliOpts {
	/// Path to the toml configuration file
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<String>,
	/// Mainnet or testnet selection
	#[arg(short, long, value_name = "network")]
	pub network: Option<Network>,
	/// Event observer HTTP host
	#[arg(long)]
	pub http_server_host: Option<String>,
	/// Event observer HTTP port
	#[arg(long)]
	pub http_server_port: Option<u16>,
	/// Blocks after which pending mempool transactions are garbage collected
	#[arg(long, env = "STACKS_MEMPOOL_TX_GARBAGE_COLLECTION_THRESHOLD")]
	pub mempool_gc_threshold_blocks: Option<u64>,
	/// Mempool statistics debounce interval in milliseconds
	#[arg(long, env = "STACKS_MEMPOOL_STATS_DEBOUNCE_INTERVAL")]
	pub mempool_stats_debounce: Option<u64>,
	/// Chain height until which the node is considered in initial block download
	#[arg(long, env = "STACKS_API_IBD_HEIGHT")]
	pub ibd_height: Option<u64>,
	/// Run a clean indexer, deleting the existing db_path folder
	#[arg(long)]
	pub clean: bool,
	/// Path to the db_path, where RocksDB stores chain state
	#[arg(long)]
	pub db_path: Option<String>,
	/// Log level
	#[arg(long)]
	pub verbosity: Option<Level>,
	/// Set logs format to JSON
	#[arg(long)]
	pub logs_json: bool,
}
