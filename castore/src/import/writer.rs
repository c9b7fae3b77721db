use std::sync::Arc;

use bytes::Bytes;
use cid::{Cid, Version};
use tracing::trace;

use crate::blockstore::BlockStore;
use crate::cancel::Cancellation;
use crate::codec::{Codec, PbNode};
use crate::digests::{compute_cid, HashAlg};
use crate::gc::WriteSession;
use crate::Error;

/// Hashes and persists the blocks produced by one import.
///
/// All writes go through the import's [WriteSession], so none of them can be
/// swept before the import is pinned. With `only_hash`, nothing is written.
pub(crate) struct BlockWriter {
    pub(crate) store: Arc<dyn BlockStore>,
    pub(crate) session: Arc<WriteSession>,
    pub(crate) hash_alg: HashAlg,
    /// Version of dag-pb nodes. Raw leaves are always CIDv1.
    pub(crate) version: Version,
    pub(crate) only_hash: bool,
    pub(crate) cancel: Cancellation,
}

impl BlockWriter {
    async fn put(&self, codec: Codec, data: Bytes) -> Result<Cid, Error> {
        self.cancel.check()?;

        let version = match codec {
            Codec::DagPb => self.version,
            _ => Version::V1,
        };
        let cid = compute_cid(&data, codec, self.hash_alg, version)?;

        if !self.only_hash {
            let written = self
                .cancel
                .run(self.session.put_block(self.store.as_ref(), &cid, data))
                .await?;
            trace!(%cid, written, "put block");
        }
        Ok(cid)
    }

    /// Stores a dag-pb node, returning its CID and the cumulative size of the
    /// DAG below it.
    pub(crate) async fn put_pb(&self, node: &PbNode) -> Result<(Cid, u64), Error> {
        let encoded = node.encode();
        let size = encoded.len() as u64 + node.links_tsize();
        let cid = self.put(Codec::DagPb, encoded.into()).await?;
        Ok((cid, size))
    }

    /// Stores a raw leaf.
    pub(crate) async fn put_raw(&self, data: Bytes) -> Result<(Cid, u64), Error> {
        let size = data.len() as u64;
        let cid = self.put(Codec::Raw, data).await?;
        Ok((cid, size))
    }
}
