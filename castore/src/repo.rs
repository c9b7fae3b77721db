//! A block store, a pin set and a collector wired together.

use std::{sync::Arc, time::Duration};

use async_stream::stream;
use bytes::Bytes;
use cid::Cid;
use futures::{
    stream::{self, BoxStream},
    Stream, StreamExt,
};
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, DurationMilliSeconds};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::blockstore::{self, BlockStore, MemoryBlockStore, StoreStat};
use crate::cancel::Cancellation;
use crate::codec::{self, Codec, Node};
use crate::digests::{cid_version, compute_cid, HashAlg};
use crate::gc::{GarbageCollector, GcOptions, GcResult, Protector};
use crate::import::{self, AddOptions, AddResult, ImportEntry};
use crate::pins::{PinAddOptions, PinEntry, PinLsOptions, PinManager, PinRmOptions};
use crate::pinstore::{MemoryPinStore, PinStore, RedbPinStore};
use crate::refs::{self, RefsOptions};
use crate::resolver::{self, IpfsPath, Resolved, ResolvedPath};
use crate::unixfs::{self, CatOptions, GetEntry, GetOptions, LsEntry, LsOptions};
use crate::Error;

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PutOptions {
    pub format: Codec,
    pub hash_alg: HashAlg,
    pub cid_version: u64,
    /// The CID the block is expected to have. Its format, hash function
    /// and version take precedence over the fields above.
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub cid: Option<Cid>,
    /// Pin the block recursively once stored.
    pub pin: bool,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            format: Codec::DagCbor,
            hash_alg: HashAlg::default(),
            cid_version: 1,
            cid: None,
            pin: false,
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeOptions {
    pub recursive: bool,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

fn failed<T: Send + 'static>(e: Error) -> BoxStream<'static, Result<T, Error>> {
    stream::once(async move { Err(e) }).boxed()
}

/// Resolves every path in `paths` to the block it ends on.
async fn resolve_blocks(
    store: &dyn BlockStore,
    paths: &[String],
    cancel: &Cancellation,
) -> Result<Vec<Cid>, Error> {
    let mut cids = Vec::with_capacity(paths.len());
    for path in paths {
        let path: IpfsPath = path.parse()?;
        let resolved = cancel.run(resolver::resolve_path(store, &path, true)).await?;
        if !resolved.remainder_path.is_empty() {
            return Err(Error::InvalidRequest(format!(
                "{} addresses a value inside {}, not a block",
                path, resolved.cid
            )));
        }
        cids.push(resolved.cid);
    }
    Ok(cids)
}

/// The operations of a content-addressed repository.
pub struct Repo {
    store: Arc<dyn BlockStore>,
    pins: Arc<PinManager>,
    protector: Arc<Protector>,
    gc: GarbageCollector,
}

impl Repo {
    pub fn new(store: Arc<dyn BlockStore>, pin_store: Arc<dyn PinStore>) -> Self {
        let protector = Arc::new(Protector::default());
        let pins = Arc::new(PinManager::new(store.clone(), pin_store, protector.clone()));
        let gc = GarbageCollector::new(store.clone(), pins.clone(), protector.clone());

        Self {
            store,
            pins,
            protector,
            gc,
        }
    }

    /// Opens a repository from an URI.
    ///
    /// - `memory://` keeps blocks and pins in memory.
    /// - `redb://` keeps both in one redb database, in memory without a
    ///   path, on disk with one (`redb:///var/lib/repo.redb`).
    pub async fn from_addr(uri: &str) -> Result<Self, Error> {
        let url = blockstore::parse_url(uri)?;

        let (store, pin_store): (Arc<dyn BlockStore>, Arc<dyn PinStore>) = match url.scheme() {
            "memory" => {
                blockstore::check_memory_url(&url)?;
                (
                    Arc::new(MemoryBlockStore::default()),
                    Arc::new(MemoryPinStore::default()),
                )
            }
            "redb" => {
                let store = blockstore::redb_from_url(&url).await?;
                let pin_store = RedbPinStore::from_database(store.database()).await?;
                (Arc::new(store), Arc::new(pin_store))
            }
            scheme => return Err(Error::StorageError(format!("unknown scheme: {}", scheme))),
        };

        Ok(Self::new(store, pin_store))
    }

    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    pub fn pins(&self) -> &Arc<PinManager> {
        &self.pins
    }

    /// Validates and stores an encoded block.
    #[instrument(skip(self, data), fields(data.len = data.len()), err)]
    pub async fn block_put(&self, data: Bytes, options: PutOptions) -> Result<Cid, Error> {
        let (format, hash_alg, version) = match options.cid {
            Some(cid) => (
                Codec::try_from(cid.codec())?,
                HashAlg::try_from(cid.hash().code())?,
                cid.version(),
            ),
            None => (
                options.format,
                options.hash_alg,
                cid_version(options.cid_version)?,
            ),
        };

        codec::decode(format.code(), &data)?;
        let cid = compute_cid(&data, format, hash_alg, version)?;
        if let Some(expected) = options.cid {
            if expected != cid {
                return Err(Error::InvalidRequest(format!(
                    "block hashes to {}, expected {}",
                    cid, expected
                )));
            }
        }

        // keeps the block alive until it is pinned.
        let session = self.protector.session();
        let written = session.put_block(self.store.as_ref(), &cid, data).await?;
        debug!(%cid, written, "put block");

        if options.pin {
            self.pins
                .add(vec![cid], true, Cancellation::default())
                .await?;
        }
        Ok(cid)
    }

    /// Encodes `node` in its own format and stores it.
    pub async fn dag_put(&self, node: &Node, options: PutOptions) -> Result<Cid, Error> {
        let data = codec::encode(node)?;
        let options = PutOptions {
            format: node.codec(),
            ..options
        };
        self.block_put(data.into(), options).await
    }

    /// Resolves `path` below `cid`, see [resolver::resolve].
    pub async fn dag_get(&self, cid: &Cid, path: &str, local_resolve: bool) -> Result<Resolved, Error> {
        resolver::resolve(self.store.as_ref(), cid, path, local_resolve).await
    }

    pub fn dag_tree(
        &self,
        cid: Cid,
        path: &str,
        options: TreeOptions,
    ) -> BoxStream<'static, Result<String, Error>> {
        resolver::tree(
            self.store.clone(),
            cid,
            path.to_string(),
            options.recursive,
            Cancellation::new(options.cancel, options.timeout),
        )
    }

    /// Resolves an IPFS path to the last CID it reaches.
    pub async fn resolve(&self, path: &str, recursive: bool) -> Result<ResolvedPath, Error> {
        let path: IpfsPath = path.parse()?;
        resolver::resolve_path(self.store.as_ref(), &path, recursive).await
    }

    pub async fn add<R>(&self, content: R, options: AddOptions) -> Result<AddResult, Error>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        import::add(
            self.store.clone(),
            self.protector.clone(),
            self.pins.clone(),
            content,
            options,
        )
        .await
    }

    pub fn add_all<S>(&self, entries: S, options: AddOptions) -> BoxStream<'static, Result<AddResult, Error>>
    where
        S: Stream<Item = ImportEntry> + Send + 'static,
    {
        import::add_all(
            self.store.clone(),
            self.protector.clone(),
            self.pins.clone(),
            entries,
            options,
        )
    }

    pub fn cat(&self, path: &str, options: CatOptions) -> BoxStream<'static, Result<Bytes, Error>> {
        let path: IpfsPath = match path.parse() {
            Ok(path) => path,
            Err(e) => return failed(e),
        };
        unixfs::cat(
            self.store.clone(),
            path,
            options.offset,
            options.length,
            Cancellation::new(options.cancel, options.timeout),
        )
    }

    pub fn ls(&self, path: &str, options: LsOptions) -> BoxStream<'static, Result<LsEntry, Error>> {
        let path: IpfsPath = match path.parse() {
            Ok(path) => path,
            Err(e) => return failed(e),
        };
        let cancel = Cancellation::new(options.cancel.clone(), options.timeout);
        unixfs::ls(self.store.clone(), path, options, cancel)
    }

    /// Exports the file or directory tree at `path`, see [unixfs::get].
    pub fn get(&self, path: &str, options: GetOptions) -> BoxStream<'static, Result<GetEntry, Error>> {
        let path: IpfsPath = match path.parse() {
            Ok(path) => path,
            Err(e) => return failed(e),
        };
        unixfs::get(
            self.store.clone(),
            path,
            Cancellation::new(options.cancel, options.timeout),
        )
    }

    /// Pins the blocks `paths` resolve to. Either all of them are pinned,
    /// or none is.
    #[instrument(skip(self, options), fields(recursive = options.recursive), err)]
    pub async fn pin_add(&self, paths: &[String], options: PinAddOptions) -> Result<Vec<Cid>, Error> {
        let cancel = Cancellation::new(options.cancel, options.timeout);
        let cids = resolve_blocks(self.store.as_ref(), paths, &cancel).await?;
        self.pins.add(cids, options.recursive, cancel).await
    }

    #[instrument(skip(self, options), fields(recursive = options.recursive), err)]
    pub async fn pin_rm(&self, paths: &[String], options: PinRmOptions) -> Result<Vec<Cid>, Error> {
        let cids = resolve_blocks(self.store.as_ref(), paths, &Cancellation::default()).await?;
        self.pins.rm(cids, options.recursive).await
    }

    pub fn pin_ls(&self, options: PinLsOptions) -> BoxStream<'static, Result<PinEntry, Error>> {
        let store = self.store.clone();
        let pins = self.pins.clone();

        Box::pin(stream! {
            let cancel = Cancellation::new(options.cancel, options.timeout);
            let cids = match resolve_blocks(store.as_ref(), &options.paths, &cancel).await {
                Ok(cids) => cids,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let mut entries = pins.ls(cids, options.kind, cancel);
            while let Some(entry) = entries.next().await {
                yield entry;
            }
        })
    }

    pub fn gc(&self, options: GcOptions) -> BoxStream<'static, GcResult> {
        self.gc.collect(options)
    }

    pub fn refs(&self, paths: Vec<String>, options: RefsOptions) -> BoxStream<'static, Result<String, Error>> {
        let store = self.store.clone();

        Box::pin(stream! {
            let cancel = Cancellation::new(options.cancel.clone(), options.timeout);
            let roots = match resolve_blocks(store.as_ref(), &paths, &cancel).await {
                Ok(roots) => roots,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let mut refs = refs::refs(store, roots, options, cancel);
            while let Some(r) = refs.next().await {
                yield r;
            }
        })
    }

    pub fn refs_local(&self) -> BoxStream<'static, Result<Cid, Error>> {
        refs::refs_local(self.store.as_ref())
    }

    pub async fn stat(&self) -> Result<StoreStat, Error> {
        self.store.stat().await
    }
}
