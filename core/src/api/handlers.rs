use super::types::{Accepted, Error};
use crate::{
	normalizer::messages::{
		CoreNodeBlockMessage, CoreNodeBurnBlockMessage, CoreNodeDropMempoolTxMessage,
		CoreNodeMicroblockMessage,
	},
	sequencer::IngestHandle,
};
use color_eyre::eyre::WrapErr;
use hyper::body::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use warp::Reply;

fn parse<T: DeserializeOwned>(kind: &str, body: &Bytes) -> Result<T, Error> {
	serde_json::from_slice(body)
		.wrap_err_with(|| format!("Invalid {kind} payload"))
		.map_err(Error::internal_server_error)
}

pub async fn new_block(handle: IngestHandle, body: Bytes) -> Result<Accepted, Error> {
	let message: CoreNodeBlockMessage = parse("block", &body)?;
	handle.new_block(message).await?;
	Ok(Accepted::Ok)
}

pub async fn new_burn_block(handle: IngestHandle, body: Bytes) -> Result<Accepted, Error> {
	let message: CoreNodeBurnBlockMessage = parse("burn block", &body)?;
	handle.new_burn_block(message).await?;
	Ok(Accepted::Ok)
}

pub async fn new_mempool_tx(handle: IngestHandle, body: Bytes) -> Result<Accepted, Error> {
	if handle.is_ibd() {
		debug!("Skipping mempool transactions during initial block download");
		return Ok(Accepted::Ibd);
	}
	let raw_txs: Vec<String> = parse("mempool transactions", &body)?;
	handle.new_mempool_txs(raw_txs).await?;
	Ok(Accepted::Ok)
}

pub async fn drop_mempool_tx(handle: IngestHandle, body: Bytes) -> Result<Accepted, Error> {
	if handle.is_ibd() {
		debug!("Skipping dropped mempool transactions during initial block download");
		return Ok(Accepted::Ibd);
	}
	let message: CoreNodeDropMempoolTxMessage = parse("dropped mempool transactions", &body)?;
	handle.drop_mempool_txs(message).await?;
	Ok(Accepted::Ok)
}

pub async fn new_microblocks(handle: IngestHandle, body: Bytes) -> Result<Accepted, Error> {
	if handle.is_ibd() {
		debug!("Skipping microblocks during initial block download");
		return Ok(Accepted::Ibd);
	}
	let message: CoreNodeMicroblockMessage = parse("microblocks", &body)?;
	handle.new_microblocks(message).await?;
	Ok(Accepted::Ok)
}

pub async fn new_attachments(body: Bytes) -> Result<Accepted, Error> {
	let attachments: Value = parse("attachments", &body)?;
	let count = attachments.as_array().map_or(0, Vec::len);
	info!(count, "Attachments received, import is not supported");
	Ok(Accepted::Ok)
}

pub fn status(handle: IngestHandle) -> impl Reply {
	warp::reply::json(&handle.chain_tip())
}
