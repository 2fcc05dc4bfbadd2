use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct APIConfig {
	/// Event observer HTTP server host name (default: 127.0.0.1).
	pub http_server_host: String,
	/// Event observer HTTP server port (default: 3700).
	pub http_server_port: u16,
	/// Maximum accepted event payload size (default: 500 MiB).
	pub body_limit_bytes: u64,
}

impl Default for APIConfig {
	fn default() -> Self {
		Self {
			http_server_host: "127.0.0.1".to_owned(),
			http_server_port: 3700,
			body_limit_bytes: 500 * 1024 * 1024,
		}
	}
}
