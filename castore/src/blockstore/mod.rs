use async_trait::async_trait;
use bytes::Bytes;
use cid::{Cid, Version};
use futures::stream::BoxStream;
use serde::Serialize;
use tracing::{instrument, trace};

use crate::codec::Codec;
use crate::digests::{compute_cid, HashAlg};
use crate::Error;

mod from_addr;
mod memory;
mod redb;

#[cfg(test)]
pub mod tests;

pub use self::from_addr::from_addr;
pub(crate) use self::from_addr::{check_memory_url, parse_url, redb_from_url};
pub use self::memory::MemoryBlockStore;
pub use self::redb::RedbBlockStore;

/// Number of blocks and bytes held by a store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStat {
    pub num_objects: u64,
    pub repo_size: u64,
}

/// The base trait all block stores need to implement.
///
/// Blocks are immutable and keyed by their CID. Writing a block that is
/// already present is a no-op, so concurrent writers of the same content
/// never conflict.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Check if the store has the block.
    async fn has(&self, cid: &Cid) -> Result<bool, Error>;

    /// Retrieve a block, [Error::NotFound] if it's not there.
    async fn get(&self, cid: &Cid) -> Result<Bytes, Error>;

    /// Store `data` under `cid` unless present already. Returns whether a
    /// write happened. The caller is responsible for `cid` matching `data`.
    async fn put_block(&self, cid: &Cid, data: Bytes) -> Result<bool, Error>;

    /// Remove a block, [Error::NotFound] if it's not there.
    async fn delete(&self, cid: &Cid) -> Result<(), Error>;

    /// Enumerate all CIDs in the store. Every call starts from the
    /// beginning.
    fn list(&self) -> BoxStream<'static, Result<Cid, Error>>;

    async fn stat(&self) -> Result<StoreStat, Error>;

    /// Compute the CID of `data` and store it, unless `only_hash` is set.
    #[instrument(skip(self, data), fields(data.len = data.len(), %codec, %hash_alg), err)]
    async fn put(
        &self,
        data: Bytes,
        codec: Codec,
        hash_alg: HashAlg,
        version: Version,
        only_hash: bool,
    ) -> Result<Cid, Error> {
        let cid = compute_cid(&data, codec, hash_alg, version)?;
        if !only_hash {
            let written = self.put_block(&cid, data).await?;
            trace!(%cid, written, "put block");
        }
        Ok(cid)
    }
}

#[async_trait]
impl<A> BlockStore for A
where
    A: AsRef<dyn BlockStore> + Send + Sync,
{
    async fn has(&self, cid: &Cid) -> Result<bool, Error> {
        self.as_ref().has(cid).await
    }

    async fn get(&self, cid: &Cid) -> Result<Bytes, Error> {
        self.as_ref().get(cid).await
    }

    async fn put_block(&self, cid: &Cid, data: Bytes) -> Result<bool, Error> {
        self.as_ref().put_block(cid, data).await
    }

    async fn delete(&self, cid: &Cid) -> Result<(), Error> {
        self.as_ref().delete(cid).await
    }

    fn list(&self) -> BoxStream<'static, Result<Cid, Error>> {
        self.as_ref().list()
    }

    async fn stat(&self) -> Result<StoreStat, Error> {
        self.as_ref().stat().await
    }
}
