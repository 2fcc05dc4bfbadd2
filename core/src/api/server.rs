//! HTTP server receiving event observer payloads from a Stacks node.
//!
//! # Endpoints
//!
//! * `/new_block` - anchor block with its transactions and events
//! * `/new_microblocks` - unconfirmed microblock stream extending the chain tip
//! * `/new_burn_block` - burnchain rewards and reward slot holders
//! * `/new_mempool_tx` - raw transactions received by the node mempool
//! * `/drop_mempool_tx` - transactions evicted from the node mempool
//! * `/attachments/new` - attachments, accepted and ignored
//! * `/health` - liveness check
//! * `/status` - current chain tip

use super::{
	configuration::APIConfig,
	routes,
	types::{Error, ErrorCode},
};
use crate::{sequencer::IngestHandle, shutdown::Monitor};
use color_eyre::{eyre::WrapErr, Result};
use futures::Future;
use std::{net::SocketAddr, str::FromStr};
use tracing::{error, info};
use warp::Reply;

pub struct Server {
	pub handle: IngestHandle,
	pub shutdown: Monitor,
}

impl Server {
	/// Creates a HTTP server that needs to be spawned into a runtime
	pub fn bind(self, cfg: APIConfig) -> Result<impl Future<Output = ()>> {
		let host = cfg.http_server_host.clone();
		let port = cfg.http_server_port;
		let routes = routes::routes(self.handle, cfg.body_limit_bytes);

		let addr = SocketAddr::from_str(format!("{host}:{port}").as_str())
			.wrap_err("Unable to parse host address from config")?;
		info!("Event observer listening on http://{host}:{port}");

		let shutdown = self.shutdown;
		let shutdown_signal = async move {
			shutdown.canceled().await;
			info!("Stopping event observer server");
		};
		let (_, server) = warp::serve(routes)
			.try_bind_with_graceful_shutdown(addr, shutdown_signal)
			.wrap_err_with(|| format!("Unable to bind event observer server to {addr}"))?;

		Ok(server)
	}
}

pub fn log_internal_server_error(result: Result<impl Reply, Error>) -> Result<impl Reply, Error> {
	if let Err(Error {
		error_code: ErrorCode::InternalServerError,
		cause: Some(error),
		..
	}) = result.as_ref()
	{
		error!("Event payload rejected: {error:#}");
	}
	result
}
