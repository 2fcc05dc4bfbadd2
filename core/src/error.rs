use crate::types::H256;
use std::fmt;
use thiserror::Error;

/// Failure to decode a binary payload (raw transaction or Clarity value).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
	#[error("Invalid Clarity value: {0}")]
	Value(String),
	#[error("Invalid transaction: {0}")]
	Transaction(String),
	#[error("{0} trailing bytes after payload")]
	TrailingBytes(usize),
	#[error("Expected {expected} bytes, got {actual}")]
	Length { expected: usize, actual: usize },
	#[error("Unsupported transaction payload {0}")]
	UnsupportedPayload(String),
}

/// Upstream message that cannot be turned into a domain update.
#[derive(Debug, Error)]
pub enum MalformedEventError {
	#[error("Invalid message body: {0}")]
	Body(#[from] serde_json::Error),
	#[error("Unknown core event type {0}")]
	UnknownEventType(String),
	#[error("Invalid {kind} event body: {source}")]
	EventBody {
		kind: String,
		source: serde_json::Error,
	},
	#[error("Event {event_index} references unknown transaction {tx_id}")]
	MissingTransaction { tx_id: H256, event_index: u32 },
	#[error("Invalid hex in {field}: {source}")]
	Hex {
		field: &'static str,
		source: hex::FromHexError,
	},
	#[error("Cannot decode {field}: {source}")]
	Decode {
		field: &'static str,
		source: DecodeError,
	},
	#[error("Transaction {0} in a microblock batch carries no microblock fields")]
	MissingMicroblockFields(H256),
	#[error("Unknown transaction status {0}")]
	UnknownTxStatus(String),
	#[error("Unknown mempool drop reason {0}")]
	UnknownDropReason(String),
	#[error("Invalid {field} value {value}")]
	InvalidNumber { field: &'static str, value: String },
}

/// Gap detected while walking a microblock stream back to sequence 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicroblockGap {
	pub missing_microblock_hash: H256,
	pub oldest_microblock_hash: H256,
	pub oldest_microblock_sequence: i32,
}

impl fmt::Display for MicroblockGap {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"missing microblock {}, the oldest microblock {} found in the chain has sequence {} rather than 0",
			self.missing_microblock_hash, self.oldest_microblock_hash, self.oldest_microblock_sequence
		)
	}
}

/// Failure of the durable store behind the in-memory tables.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("Database error: {0}")]
	Database(String),
	#[error("Column family {0} is missing")]
	MissingColumn(&'static str),
	#[error("Cannot encode or decode {column} row: {source}")]
	Codec {
		column: &'static str,
		source: serde_json::Error,
	},
}

/// Store state that contradicts chain invariants. Aborts the current event.
#[derive(Debug, Error)]
pub enum ChainError {
	#[error("Found more than one non-canonical parent to restore during reorg of {0}")]
	MultipleNonCanonicalParents(H256),
	#[error("Could not find orphaned block {0}")]
	MissingOrphanedBlock(H256),
	#[error("Could not find microblock {microblock_hash} extending {parent_index_block_hash}")]
	MissingParentMicroblock {
		microblock_hash: H256,
		parent_index_block_hash: H256,
	},
	#[error("Anchor block {index_block_hash} has parent microblock sequence {sequence} but no parent microblock")]
	InvalidParentMicroblockSequence { index_block_hash: H256, sequence: i32 },
	#[error("Unexpected number of {table} rows updated: expected {expected}, got {actual}")]
	RowCountMismatch {
		table: &'static str,
		expected: usize,
		actual: usize,
	},
	#[error("Gap in parent microblock stream for block {index_block_hash}, {gap}")]
	UnresolvedMicroblockGap {
		index_block_hash: H256,
		gap: MicroblockGap,
	},
	#[error("Cannot persist chain state: {0}")]
	Store(#[from] StoreError),
}

/// Outcome of a failed ingestion as seen by the submitter.
#[derive(Debug, Error)]
pub enum IngestError {
	#[error(transparent)]
	Malformed(#[from] MalformedEventError),
	#[error(transparent)]
	Chain(#[from] ChainError),
	#[error("Ingestion worker failed while processing {0}")]
	WorkerFailed(&'static str),
	#[error("Ingestion queue is closed")]
	QueueClosed,
}
