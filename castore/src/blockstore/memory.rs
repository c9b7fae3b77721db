use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use tracing::instrument;

use super::{BlockStore, StoreStat};
use crate::Error;

#[derive(Clone, Default)]
pub struct MemoryBlockStore {
    db: Arc<RwLock<HashMap<Cid, Bytes>>>,
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    #[instrument(skip(self, cid), fields(block.cid = %cid))]
    async fn has(&self, cid: &Cid) -> Result<bool, Error> {
        Ok(self.db.read().contains_key(cid))
    }

    #[instrument(skip(self, cid), fields(block.cid = %cid))]
    async fn get(&self, cid: &Cid) -> Result<Bytes, Error> {
        self.db
            .read()
            .get(cid)
            .cloned()
            .ok_or(Error::NotFound(*cid))
    }

    #[instrument(skip(self, cid, data), fields(block.cid = %cid))]
    async fn put_block(&self, cid: &Cid, data: Bytes) -> Result<bool, Error> {
        let mut db = self.db.write();
        if db.contains_key(cid) {
            return Ok(false);
        }
        db.insert(*cid, data);
        Ok(true)
    }

    #[instrument(skip(self, cid), fields(block.cid = %cid))]
    async fn delete(&self, cid: &Cid) -> Result<(), Error> {
        match self.db.write().remove(cid) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(*cid)),
        }
    }

    fn list(&self) -> BoxStream<'static, Result<Cid, Error>> {
        let cids: Vec<Cid> = self.db.read().keys().copied().collect();
        stream::iter(cids.into_iter().map(Ok)).boxed()
    }

    async fn stat(&self) -> Result<StoreStat, Error> {
        let db = self.db.read();
        Ok(StoreStat {
            num_objects: db.len() as u64,
            repo_size: db.values().map(|b| b.len() as u64).sum(),
        })
    }
}
