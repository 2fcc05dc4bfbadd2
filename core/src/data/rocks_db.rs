use super::{Backend, Column, Entry};
use crate::error::StoreError;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch};
use std::sync::Arc;
use strum::IntoEnumIterator;

/// On disk backend with a column family per [`Column`].
#[derive(Clone)]
pub struct RocksDB {
	db: Arc<rocksdb::DB>,
}

impl From<rocksdb::Error> for StoreError {
	fn from(error: rocksdb::Error) -> Self {
		StoreError::Database(error.into_string())
	}
}

impl RocksDB {
	pub fn open(path: &str) -> Result<RocksDB, StoreError> {
		let cf_opts = Column::iter()
			.map(|column| ColumnFamilyDescriptor::new(column.name(), Options::default()))
			.collect::<Vec<_>>();

		let mut db_opts = Options::default();
		db_opts.create_if_missing(true);
		db_opts.create_missing_column_families(true);

		let db = rocksdb::DB::open_cf_descriptors(&db_opts, path, cf_opts)?;
		Ok(RocksDB { db: Arc::new(db) })
	}

	fn cf_handle(&self, column: Column) -> Result<Arc<rocksdb::BoundColumnFamily<'_>>, StoreError> {
		self.db
			.cf_handle(column.name())
			.ok_or(StoreError::MissingColumn(column.name()))
	}
}

impl Backend for RocksDB {
	fn write(&self, entries: Vec<Entry>) -> Result<(), StoreError> {
		let mut batch = WriteBatch::default();
		for Entry { column, key, value } in entries {
			batch.put_cf(&self.cf_handle(column)?, key, value);
		}
		self.db.write(batch)?;
		Ok(())
	}

	fn load(&self, column: Column) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
		let cf_handle = self.cf_handle(column)?;
		self.db
			.iterator_cf(&cf_handle, IteratorMode::Start)
			.map(|item| {
				let (key, value) = item?;
				Ok((key.into_vec(), value.into_vec()))
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::RocksDB;
	use crate::data::{position_key, Backend, Column, Entry, TIP_KEY};

	fn entry(column: Column, key: Vec<u8>, value: &[u8]) -> Entry {
		Entry {
			column,
			key,
			value: value.to_vec(),
		}
	}

	#[test]
	fn batch_survives_reopen() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().to_str().unwrap();
		{
			let db = RocksDB::open(path).unwrap();
			db.write(vec![
				entry(Column::Blocks, position_key(1), b"second"),
				entry(Column::Blocks, position_key(0), b"first"),
				entry(Column::State, TIP_KEY.to_vec(), b"tip"),
			])
			.unwrap();
		}

		let db = RocksDB::open(path).unwrap();
		let blocks = db.load(Column::Blocks).unwrap();
		let values: Vec<&[u8]> = blocks.iter().map(|(_, value)| value.as_slice()).collect();
		assert_eq!(values, vec![&b"first"[..], &b"second"[..]]);
		assert_eq!(db.load(Column::State).unwrap(), vec![(TIP_KEY.to_vec(), b"tip".to_vec())]);
		assert!(db.load(Column::Mempool).unwrap().is_empty());
	}

	#[test]
	fn positions_sort_numerically() {
		let dir = tempfile::tempdir().unwrap();
		let db = RocksDB::open(dir.path().to_str().unwrap()).unwrap();
		db.write(vec![
			entry(Column::Txs, position_key(256), b"256"),
			entry(Column::Txs, position_key(2), b"2"),
		])
		.unwrap();
		let keys: Vec<Vec<u8>> = db.load(Column::Txs).unwrap().into_iter().map(|(key, _)| key).collect();
		assert_eq!(keys, vec![position_key(2), position_key(256)]);
	}
}
