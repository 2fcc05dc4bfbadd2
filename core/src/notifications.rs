//! Change notification bus.
//!
//! Published only after the write producing them is committed. Delivery is
//! best effort: with no subscribers, or a lagging one, messages are lost.

use crate::{
	chain::MempoolStats,
	types::{Block, Microblock, TxUpdate, H256},
};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeNotification {
	Block {
		block_hash: H256,
		index_block_hash: H256,
		block_height: u64,
	},
	Microblock {
		microblock_hash: H256,
	},
	Tx {
		tx_id: H256,
	},
	SmartContract {
		contract_id: String,
	},
	SmartContractLog {
		contract_id: String,
		tx_id: H256,
		event_index: u32,
	},
	NftEvent {
		asset_identifier: String,
		tx_id: H256,
		event_index: u32,
	},
	AddressActivity {
		address: String,
		block_height: u64,
	},
	MempoolStats(MempoolStats),
}

#[derive(Clone)]
pub struct Notifier {
	sender: broadcast::Sender<ChangeNotification>,
}

impl Notifier {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Notifier { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
		self.sender.subscribe()
	}

	pub fn publish(&self, notifications: impl IntoIterator<Item = ChangeNotification>) {
		for notification in notifications {
			// fails only when nobody listens
			if self.sender.send(notification).is_err() {
				trace!("No notification subscribers");
			}
		}
	}
}

/// Notifications collected while a write is in progress.
#[derive(Debug, Default)]
pub struct ChangeSet {
	notifications: Vec<ChangeNotification>,
	addresses: BTreeMap<String, u64>,
}

impl ChangeSet {
	pub fn is_empty(&self) -> bool {
		self.notifications.is_empty() && self.addresses.is_empty()
	}

	pub fn block(&mut self, block: &Block) {
		self.notifications.push(ChangeNotification::Block {
			block_hash: block.block_hash,
			index_block_hash: block.index_block_hash,
			block_height: block.block_height,
		});
	}

	pub fn microblock(&mut self, microblock: &Microblock) {
		self.notifications.push(ChangeNotification::Microblock {
			microblock_hash: microblock.microblock_hash,
		});
	}

	pub fn tx_id(&mut self, tx_id: H256) {
		self.notifications.push(ChangeNotification::Tx { tx_id });
	}

	/// Transaction, its contracts, logs, NFT events and every address it touched.
	pub fn tx(&mut self, update: &TxUpdate) {
		let tx_id = update.tx_id();
		let block_height = update.tx.confirmation.block_height;
		self.tx_id(tx_id);

		for contract in &update.smart_contracts {
			self.notifications.push(ChangeNotification::SmartContract {
				contract_id: contract.data.contract_id.clone(),
			});
		}
		for log in &update.contract_logs {
			self.notifications.push(ChangeNotification::SmartContractLog {
				contract_id: log.data.contract_identifier.clone(),
				tx_id,
				event_index: log.data.event_index,
			});
		}
		for event in &update.nft_events {
			self.notifications.push(ChangeNotification::NftEvent {
				asset_identifier: event.data.asset_identifier.clone(),
				tx_id,
				event_index: event.data.event_index,
			});
		}

		let body = &update.tx.data.body;
		let addresses = [Some(&body.sender_address), body.sponsor_address.as_ref()]
			.into_iter()
			.flatten()
			.chain(update.stx_events.iter().flat_map(|e| [&e.data.sender, &e.data.recipient]).flatten())
			.chain(update.ft_events.iter().flat_map(|e| [&e.data.sender, &e.data.recipient]).flatten())
			.chain(update.nft_events.iter().flat_map(|e| [&e.data.sender, &e.data.recipient]).flatten())
			.chain(update.stx_lock_events.iter().map(|e| &e.data.locked_address));
		for address in addresses {
			self.addresses
				.entry(address.clone())
				.and_modify(|height| *height = (*height).max(block_height))
				.or_insert(block_height);
		}
	}

	pub fn into_notifications(self) -> Vec<ChangeNotification> {
		let addresses = self
			.addresses
			.into_iter()
			.map(|(address, block_height)| ChangeNotification::AddressActivity {
				address,
				block_height,
			});
		self.notifications.into_iter().chain(addresses).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::{ChangeNotification, ChangeSet, Notifier};
	use crate::{
		fixtures::{self, h},
		types::AssetEventType,
	};

	#[test]
	fn publish_without_subscribers() {
		let notifier = Notifier::new(0);
		notifier.publish([ChangeNotification::Tx { tx_id: h("tx") }]);
	}

	#[tokio::test]
	async fn subscribers_receive_in_order() {
		let notifier = Notifier::new(16);
		let mut receiver = notifier.subscribe();
		notifier.publish([
			ChangeNotification::Tx { tx_id: h("a") },
			ChangeNotification::Tx { tx_id: h("b") },
		]);

		assert_eq!(receiver.recv().await.unwrap(), ChangeNotification::Tx { tx_id: h("a") });
		assert_eq!(receiver.recv().await.unwrap(), ChangeNotification::Tx { tx_id: h("b") });
	}

	#[test]
	fn address_activity_is_reported_once() {
		let confirmation = fixtures::confirmation(h("tx"), h("index-a"), 4);
		let mut update = fixtures::tx_update(confirmation.clone());
		update.nft_events.push(fixtures::nft_event(confirmation.clone(), 0, AssetEventType::Mint, "SP1"));
		update.nft_events.push(fixtures::nft_event(confirmation, 1, AssetEventType::Transfer, "SP1"));

		let mut changes = ChangeSet::default();
		changes.tx(&update);
		let notifications = changes.into_notifications();

		let activity: Vec<_> = notifications
			.iter()
			.filter_map(|notification| match notification {
				ChangeNotification::AddressActivity { address, block_height } => Some((address.as_str(), *block_height)),
				_ => None,
			})
			.collect();
		assert!(activity.contains(&("SP1", 4)));
		assert_eq!(activity.iter().filter(|(address, _)| *address == "SP1").count(), 1);
		assert_eq!(
			notifications
				.iter()
				.filter(|n| matches!(n, ChangeNotification::NftEvent { .. }))
				.count(),
			2
		);
	}
}
