use std::{ops::Bound, path::PathBuf, sync::Arc};

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use futures::stream::BoxStream;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use tracing::{instrument, warn};

use super::{BlockStore, StoreStat};
use crate::{digests, Error};

const BLOCKS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blocks");

/// Number of keys read per transaction while listing.
const LIST_BATCH_SIZE: usize = 1024;

#[derive(Clone)]
pub struct RedbBlockStore {
    // We wrap the db in an Arc to be able to move it into spawn_blocking,
    // as discussed in https://github.com/cberner/redb/issues/789
    db: Arc<Database>,
}

impl RedbBlockStore {
    /// Constructs a new instance using the specified filesystem path for
    /// storage.
    pub async fn new(path: PathBuf) -> Result<Self, Error> {
        if path == PathBuf::from("/") {
            return Err(Error::StorageError(
                "cowardly refusing to open / with redb".to_string(),
            ));
        }

        let db = tokio::task::spawn_blocking(|| -> Result<_, redb::Error> {
            let db = redb::Database::create(path)?;
            create_schema(&db)?;
            Ok(db)
        })
        .await??;

        Ok(Self { db: Arc::new(db) })
    }

    /// Constructs a new instance using the in-memory backend.
    pub fn new_temporary() -> Result<Self, Error> {
        let db =
            redb::Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;

        create_schema(&db)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// The underlying database, so other tables (pins) can live next to the
    /// blocks.
    pub fn database(&self) -> Arc<Database> {
        self.db.clone()
    }
}

/// Ensures all tables are present.
fn create_schema(db: &redb::Database) -> Result<(), redb::Error> {
    let txn = db.begin_write()?;
    txn.open_table(BLOCKS_TABLE)?;
    txn.commit()?;

    Ok(())
}

#[async_trait]
impl BlockStore for RedbBlockStore {
    #[instrument(skip(self, cid), fields(block.cid = %cid))]
    async fn has(&self, cid: &Cid) -> Result<bool, Error> {
        let db = self.db.clone();
        let key = cid.to_bytes();
        tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let txn = db.begin_read()?;
            let table = txn.open_table(BLOCKS_TABLE)?;
            Ok(table.get(key.as_slice())?.is_some())
        })
        .await?
    }

    #[instrument(skip(self, cid), fields(block.cid = %cid))]
    async fn get(&self, cid: &Cid) -> Result<Bytes, Error> {
        let db = self.db.clone();
        let key = cid.to_bytes();
        let data = tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let txn = db.begin_read()?;
            let table = txn.open_table(BLOCKS_TABLE)?;
            Ok(table.get(key.as_slice())?.map(|v| v.value().to_vec()))
        })
        .await?
        .map_err(|e| {
            warn!(err=%e, "failed to retrieve block");
            e
        })?
        .ok_or(Error::NotFound(*cid))?;

        // We check the retrieved bytes still hash to the requested CID.
        if !digests::verify(cid, &data)? {
            warn!("requested block got the wrong digest");
            return Err(Error::StorageError(format!(
                "block {} got the wrong digest",
                cid
            )));
        }

        Ok(data.into())
    }

    #[instrument(skip(self, cid, data), fields(block.cid = %cid))]
    async fn put_block(&self, cid: &Cid, data: Bytes) -> Result<bool, Error> {
        let db = self.db.clone();
        let key = cid.to_bytes();
        tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let txn = db.begin_write()?;
            let written = {
                let mut table = txn.open_table(BLOCKS_TABLE)?;
                if table.get(key.as_slice())?.is_some() {
                    false
                } else {
                    table.insert(key.as_slice(), data.as_ref())?;
                    true
                }
            };
            txn.commit()?;
            Ok(written)
        })
        .await?
    }

    #[instrument(skip(self, cid), fields(block.cid = %cid))]
    async fn delete(&self, cid: &Cid) -> Result<(), Error> {
        let db = self.db.clone();
        let key = cid.to_bytes();
        let removed = tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let txn = db.begin_write()?;
            let removed = txn
                .open_table(BLOCKS_TABLE)?
                .remove(key.as_slice())?
                .is_some();
            txn.commit()?;
            Ok(removed)
        })
        .await??;

        if removed {
            Ok(())
        } else {
            Err(Error::NotFound(*cid))
        }
    }

    /// Keys are read in batches, each in its own read transaction, so a long
    /// listing does not pin an old snapshot of the database.
    fn list(&self) -> BoxStream<'static, Result<Cid, Error>> {
        let db = self.db.clone();

        Box::pin(try_stream! {
            let mut after: Option<Vec<u8>> = None;
            loop {
                let batch = tokio::task::spawn_blocking({
                    let db = db.clone();
                    let after = after.clone();
                    move || -> Result<Vec<Vec<u8>>, Error> {
                        let txn = db.begin_read()?;
                        let table = txn.open_table(BLOCKS_TABLE)?;
                        let lower = match &after {
                            Some(k) => Bound::Excluded(k.as_slice()),
                            None => Bound::Unbounded,
                        };
                        let mut keys = Vec::new();
                        for entry in table.range::<&[u8]>((lower, Bound::Unbounded))? {
                            let (k, _) = entry?;
                            keys.push(k.value().to_vec());
                            if keys.len() == LIST_BATCH_SIZE {
                                break;
                            }
                        }
                        Ok(keys)
                    }
                })
                .await??;

                let done = batch.len() < LIST_BATCH_SIZE;
                after = batch.last().cloned();

                for key in batch {
                    let cid = Cid::try_from(key.as_slice()).map_err(|e| {
                        warn!(err=%e, "invalid key in blocks table");
                        Error::StorageError(format!("invalid key in blocks table: {}", e))
                    })?;
                    yield cid;
                }

                if done {
                    break;
                }
            }
        })
    }

    async fn stat(&self) -> Result<StoreStat, Error> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let txn = db.begin_read()?;
            let table = txn.open_table(BLOCKS_TABLE)?;
            let mut repo_size = 0;
            for entry in table.iter()? {
                let (_, v) = entry?;
                repo_size += v.value().len() as u64;
            }
            Ok(StoreStat {
                num_objects: table.len()?,
                repo_size,
            })
        })
        .await?
    }
}
