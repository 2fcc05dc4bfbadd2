use super::{handlers, server::log_internal_server_error};
use crate::sequencer::IngestHandle;
use hyper::body::Bytes;
use std::convert::Infallible;
use warp::{Filter, Rejection, Reply};

fn with_handle(
	handle: IngestHandle,
) -> impl Filter<Extract = (IngestHandle,), Error = Infallible> + Clone {
	warp::any().map(move || handle.clone())
}

fn event_body(body_limit: u64) -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
	warp::body::content_length_limit(body_limit).and(warp::body::bytes())
}

pub fn health_route() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::head()
		.or(warp::get())
		.and(warp::path("health"))
		.and(warp::path::end())
		.map(|_| warp::reply::with_status("", warp::http::StatusCode::OK))
}

pub fn status_route(
	handle: IngestHandle,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path!("status")
		.and(warp::get())
		.and(with_handle(handle))
		.map(handlers::status)
}

pub fn new_block_route(
	handle: IngestHandle,
	body_limit: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path!("new_block")
		.and(warp::post())
		.and(with_handle(handle))
		.and(event_body(body_limit))
		.then(handlers::new_block)
		.map(log_internal_server_error)
}

pub fn new_burn_block_route(
	handle: IngestHandle,
	body_limit: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path!("new_burn_block")
		.and(warp::post())
		.and(with_handle(handle))
		.and(event_body(body_limit))
		.then(handlers::new_burn_block)
		.map(log_internal_server_error)
}

pub fn new_mempool_tx_route(
	handle: IngestHandle,
	body_limit: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path!("new_mempool_tx")
		.and(warp::post())
		.and(with_handle(handle))
		.and(event_body(body_limit))
		.then(handlers::new_mempool_tx)
		.map(log_internal_server_error)
}

pub fn drop_mempool_tx_route(
	handle: IngestHandle,
	body_limit: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path!("drop_mempool_tx")
		.and(warp::post())
		.and(with_handle(handle))
		.and(event_body(body_limit))
		.then(handlers::drop_mempool_tx)
		.map(log_internal_server_error)
}

pub fn new_microblocks_route(
	handle: IngestHandle,
	body_limit: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path!("new_microblocks")
		.and(warp::post())
		.and(with_handle(handle))
		.and(event_body(body_limit))
		.then(handlers::new_microblocks)
		.map(log_internal_server_error)
}

pub fn attachments_route(
	body_limit: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path!("attachments" / "new")
		.and(warp::post())
		.and(event_body(body_limit))
		.then(handlers::new_attachments)
		.map(log_internal_server_error)
}

/// Every event observer route.
pub fn routes(
	handle: IngestHandle,
	body_limit: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	health_route()
		.or(status_route(handle.clone()))
		.or(new_block_route(handle.clone(), body_limit))
		.or(new_burn_block_route(handle.clone(), body_limit))
		.or(new_mempool_tx_route(handle.clone(), body_limit))
		.or(drop_mempool_tx_route(handle.clone(), body_limit))
		.or(new_microblocks_route(handle, body_limit))
		.or(attachments_route(body_limit))
}

#[cfg(test)]
mod tests {
	use crate::{
		chain::{ChainConfig, ChainEngine},
		data::{ChainStore, MemoryStore},
		fixtures::{self, h},
		normalizer::messages::CoreNodeDropMempoolTxMessage,
		notifications::Notifier,
		sequencer::{IngestHandle, Sequencer},
		shutdown::Controller,
		types::ChainTip,
	};
	use hyper::StatusCode;
	use serde::Serialize;
	use std::sync::Arc;
	use test_case::test_case;

	const BODY_LIMIT: u64 = 1024 * 1024;

	fn ingest_handle(shutdown: &Controller, config: ChainConfig) -> IngestHandle {
		ingest_handle_with_store(shutdown, config, MemoryStore::default())
	}

	fn ingest_handle_with_store(
		shutdown: &Controller,
		config: ChainConfig,
		store: MemoryStore,
	) -> IngestHandle {
		let (sequencer, worker) = Sequencer::new(shutdown.watch());
		tokio::spawn(worker.run());
		let engine = ChainEngine::new(store, Notifier::new(64), config);
		IngestHandle::new(Arc::new(engine), sequencer)
	}

	fn json<T: Serialize>(value: &T) -> Vec<u8> {
		serde_json::to_vec(value).unwrap()
	}

	fn raw_transfer() -> String {
		format!("0x{}", hex::encode(fixtures::transfer_raw(1, 0)))
	}

	#[test_case("GET" ; "get")]
	#[test_case("HEAD" ; "head")]
	#[tokio::test]
	async fn health_route(method: &str) {
		let route = super::health_route();
		let response = warp::test::request()
			.method(method)
			.path("/health")
			.reply(&route)
			.await;
		assert_eq!(response.status(), StatusCode::OK);
		assert!(response.body().is_empty());
	}

	#[tokio::test]
	async fn new_block_updates_status() {
		let shutdown = Controller::new();
		let handle = ingest_handle(&shutdown, ChainConfig::default());
		let route = super::routes(handle, BODY_LIMIT);

		let message = fixtures::block_message("b1", 1, None, vec![fixtures::coinbase_tx(1, 0)]);
		let response = warp::test::request()
			.method("POST")
			.path("/new_block")
			.body(json(&message))
			.reply(&route)
			.await;
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(response.body(), r#"{"result":"ok"}"#);

		let response = warp::test::request()
			.method("GET")
			.path("/status")
			.reply(&route)
			.await;
		let tip: ChainTip = serde_json::from_slice(response.body()).unwrap();
		assert_eq!(tip.block_height, 1);
		assert_eq!(tip.index_block_hash, h("index-b1"));
		assert_eq!(tip.tx_count, 1);
	}

	#[test_case("/new_block" ; "block")]
	#[test_case("/new_burn_block" ; "burn block")]
	#[test_case("/new_mempool_tx" ; "mempool")]
	#[test_case("/drop_mempool_tx" ; "dropped mempool")]
	#[test_case("/new_microblocks" ; "microblocks")]
	#[tokio::test]
	async fn malformed_payload_is_rejected(path: &str) {
		let shutdown = Controller::new();
		let handle = ingest_handle(&shutdown, ChainConfig::default());
		let route = super::routes(handle, BODY_LIMIT);

		let response = warp::test::request()
			.method("POST")
			.path(path)
			.body(r#"{"unexpected":true}"#)
			.reply(&route)
			.await;
		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
		let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
		assert!(body["error"].as_str().is_some_and(|error| error.starts_with("Invalid")));
	}

	#[tokio::test]
	async fn undecodable_transaction_is_rejected() {
		let shutdown = Controller::new();
		let handle = ingest_handle(&shutdown, ChainConfig::default());
		let route = super::routes(handle.clone(), BODY_LIMIT);

		let response = warp::test::request()
			.method("POST")
			.path("/new_mempool_tx")
			.body(json(&vec!["0x00"]))
			.reply(&route)
			.await;
		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(handle.chain_tip().mempool_tx_count, 0);
	}

	#[tokio::test]
	async fn mempool_lifecycle() {
		let shutdown = Controller::new();
		let handle = ingest_handle(&shutdown, ChainConfig::default());
		let route = super::routes(handle.clone(), BODY_LIMIT);

		let response = warp::test::request()
			.method("POST")
			.path("/new_mempool_tx")
			.body(json(&vec![raw_transfer()]))
			.reply(&route)
			.await;
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(handle.chain_tip().mempool_tx_count, 1);

		let tx_id = fixtures::transfer_tx(1, 0, 0).txid;
		let drop = CoreNodeDropMempoolTxMessage {
			dropped_txids: vec![tx_id],
			reason: "TooExpensive".to_string(),
		};
		let response = warp::test::request()
			.method("POST")
			.path("/drop_mempool_tx")
			.body(json(&drop))
			.reply(&route)
			.await;
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(handle.chain_tip().mempool_tx_count, 0);
	}

	#[test_case("/new_mempool_tx" ; "mempool")]
	#[test_case("/drop_mempool_tx" ; "dropped mempool")]
	#[test_case("/new_microblocks" ; "microblocks")]
	#[tokio::test]
	async fn initial_block_download_short_circuits(path: &str) {
		let shutdown = Controller::new();
		let config = ChainConfig {
			ibd_height: Some(10),
			..Default::default()
		};
		let handle = ingest_handle(&shutdown, config);
		let route = super::routes(handle.clone(), BODY_LIMIT);

		let response = warp::test::request()
			.method("POST")
			.path(path)
			.body(json(&vec![raw_transfer()]))
			.reply(&route)
			.await;
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(response.body(), "IBD");
		assert_eq!(handle.chain_tip().mempool_tx_count, 0);
	}

	#[tokio::test]
	async fn burn_block_is_recorded() {
		let shutdown = Controller::new();
		let store = MemoryStore::default();
		let handle = ingest_handle_with_store(&shutdown, ChainConfig::default(), store.clone());
		let route = super::routes(handle, BODY_LIMIT);

		let message = fixtures::burn_block_message("burn-1", 100, 2, 1);
		let response = warp::test::request()
			.method("POST")
			.path("/new_burn_block")
			.body(json(&message))
			.reply(&route)
			.await;
		assert_eq!(response.status(), StatusCode::OK);
		let rewards = store.read().burnchain_rewards(&h("burn-1"));
		assert_eq!(rewards.len(), 2);
		assert!(rewards.iter().all(|reward| reward.canonical));
		assert_eq!(store.read().reward_slot_holders(&h("burn-1")).len(), 1);
	}

	#[tokio::test]
	async fn attachments_are_accepted() {
		let route = super::attachments_route(BODY_LIMIT);
		let response = warp::test::request()
			.method("POST")
			.path("/attachments/new")
			.body(r#"[{"content_hash":"0x00"}]"#)
			.reply(&route)
			.await;
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(response.body(), r#"{"result":"ok"}"#);
	}

	#[tokio::test]
	async fn oversized_payload_is_refused() {
		let shutdown = Controller::new();
		let handle = ingest_handle(&shutdown, ChainConfig::default());
		let route = super::new_block_route(handle, 16);

		let message = fixtures::block_message("b1", 1, None, vec![]);
		let response = warp::test::request()
			.method("POST")
			.path("/new_block")
			.body(json(&message))
			.reply(&route)
			.await;
		assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
	}
}
