//! Imports files and directory trees as UnixFS DAGs.
//!
//! The main library function here is [add_all], receiving a stream of
//! [ImportEntry]. Every file is chunked and laid out as soon as its entry
//! arrives. Directories are assembled once the input ends, and reported
//! after their children.

use std::{fmt, sync::Arc, time::Duration};

use async_stream::try_stream;
use cid::{Cid, Version};
use futures::{stream::BoxStream, Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, DurationMilliSeconds};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::blockstore::BlockStore;
use crate::cancel::Cancellation;
use crate::codec::{unixfs::DEFAULT_FILE_MODE, Mtime};
use crate::digests::{cid_version, HashAlg};
use crate::gc::Protector;
use crate::pins::PinManager;
use crate::unixfs::hamt::{Layout, DEFAULT_FANOUT};
use crate::Error;

pub mod chunker;
mod dir;
mod layout;
mod writer;

pub use chunker::Chunker;
pub use dir::DEFAULT_SHARD_SPLIT_THRESHOLD;
pub use layout::{DEFAULT_LAYER_REPEAT, DEFAULT_MAX_CHILDREN};

use dir::{normalize, DirBuilder, DirParams};
use layout::{build_file, FileParams};
use writer::BlockWriter;

/// Called with the number of bytes of a file processed so far, and the
/// file's path.
pub type ProgressFn = Arc<dyn Fn(u64, &str) + Send + Sync>;

#[serde_as]
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddOptions {
    #[serde_as(as = "DisplayFromStr")]
    pub chunker: Chunker,
    pub cid_version: u64,
    pub hash_alg: HashAlg,
    /// Defaults to true for CIDv1.
    pub raw_leaves: Option<bool>,
    pub trickle: bool,
    /// Compute CIDs without storing anything.
    pub only_hash: bool,
    /// Recursively pin every top-level result.
    pub pin: bool,
    /// Add a directory around all entries, reported last with an empty
    /// path.
    pub wrap_with_directory: bool,
    pub enable_sharding_experiment: bool,
    pub shard_split_threshold: usize,
    pub shard_fanout: u64,
    pub max_children_per_node: usize,
    pub layer_repeat: usize,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
    #[serde(skip)]
    pub progress: Option<ProgressFn>,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            chunker: Chunker::default(),
            cid_version: 0,
            hash_alg: HashAlg::default(),
            raw_leaves: None,
            trickle: false,
            only_hash: false,
            pin: true,
            wrap_with_directory: false,
            enable_sharding_experiment: false,
            shard_split_threshold: DEFAULT_SHARD_SPLIT_THRESHOLD,
            shard_fanout: DEFAULT_FANOUT,
            max_children_per_node: DEFAULT_MAX_CHILDREN,
            layer_repeat: DEFAULT_LAYER_REPEAT,
            timeout: None,
            cancel: None,
            progress: None,
        }
    }
}

impl fmt::Debug for AddOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddOptions")
            .field("chunker", &self.chunker.to_string())
            .field("cid_version", &self.cid_version)
            .field("hash_alg", &self.hash_alg)
            .field("raw_leaves", &self.raw_leaves)
            .field("trickle", &self.trickle)
            .field("only_hash", &self.only_hash)
            .field("pin", &self.pin)
            .field("wrap_with_directory", &self.wrap_with_directory)
            .field("enable_sharding_experiment", &self.enable_sharding_experiment)
            .field("shard_split_threshold", &self.shard_split_threshold)
            .field("shard_fanout", &self.shard_fanout)
            .field("max_children_per_node", &self.max_children_per_node)
            .field("layer_repeat", &self.layer_repeat)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// The validated settings of one import.
struct Settings {
    version: Version,
    file: FileParams,
    dir: DirParams,
}

impl AddOptions {
    fn settings(&self) -> Result<Settings, Error> {
        let requested = cid_version(self.cid_version)?;
        let raw_leaves = self.raw_leaves.unwrap_or(requested == Version::V1);

        // CIDv0 can only name dag-pb nodes hashed with sha2-256, and a DAG
        // with raw leaves needs CIDv1 links anyway.
        let version = if requested == Version::V0 && (raw_leaves || self.hash_alg != HashAlg::Sha2_256) {
            debug!(hash_alg = %self.hash_alg, raw_leaves, "upgrading to cidv1");
            Version::V1
        } else {
            requested
        };

        if self.max_children_per_node < 2 {
            return Err(Error::InvalidRequest(format!(
                "max_children_per_node must be at least 2, got {}",
                self.max_children_per_node
            )));
        }
        if self.layer_repeat == 0 {
            return Err(Error::InvalidRequest(
                "layer_repeat must be at least 1".to_string(),
            ));
        }

        let shard_layout = if self.enable_sharding_experiment {
            if self.shard_split_threshold == 0 {
                return Err(Error::ShardingLimitExceeded(
                    "shard_split_threshold must be at least 1".to_string(),
                ));
            }
            Some(Layout::new(self.shard_fanout)?)
        } else {
            None
        };

        Ok(Settings {
            version,
            file: FileParams {
                raw_leaves,
                trickle: self.trickle,
                max_children: self.max_children_per_node,
                layer_repeat: self.layer_repeat,
                mode: None,
                mtime: None,
            },
            dir: DirParams {
                shard_layout,
                shard_split_threshold: self.shard_split_threshold,
            },
        })
    }
}

pub enum ImportContent {
    File(Box<dyn AsyncRead + Send + Unpin>),
    Directory,
}

/// One file or directory to import. Paths are `/`-separated and relative
/// to the import root. Parent directories are created implicitly.
pub struct ImportEntry {
    pub path: String,
    pub content: ImportContent,
    pub mode: Option<u32>,
    pub mtime: Option<Mtime>,
}

impl ImportEntry {
    pub fn file<R>(path: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            path: path.into(),
            content: ImportContent::File(Box::new(reader)),
            mode: None,
            mtime: None,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: ImportContent::Directory,
            mode: None,
            mtime: None,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_mtime(mut self, mtime: Mtime) -> Self {
        self.mtime = Some(mtime);
        self
    }
}

/// A file or directory created by an import.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddResult {
    /// Path of the entry, the CID for unnamed content, empty for the
    /// wrapping directory.
    pub path: String,
    pub cid: Cid,
    pub mode: u32,
    pub mtime: Option<Mtime>,
    /// Cumulative size of the DAG.
    pub size: u64,
}

impl AddResult {
    fn is_top_level(&self) -> bool {
        !self.path.contains('/')
    }
}

/// Imports `entries`, yielding a result for every file as it completes and
/// for every directory after its children.
///
/// Every block is written through a write session of `protector`, so a
/// concurrent collection can't remove it before the import's pins are
/// recorded. The first failure ends the stream.
#[instrument(skip_all, fields(options = ?options))]
pub fn add_all<S>(
    store: Arc<dyn BlockStore>,
    protector: Arc<Protector>,
    pins: Arc<PinManager>,
    entries: S,
    options: AddOptions,
) -> BoxStream<'static, Result<AddResult, Error>>
where
    S: Stream<Item = ImportEntry> + Send + 'static,
{
    Box::pin(try_stream! {
        let settings = options.settings()?;
        let cancel = Cancellation::new(options.cancel.clone(), options.timeout);
        let writer = BlockWriter {
            store,
            session: Arc::new(protector.session()),
            hash_alg: options.hash_alg,
            version: settings.version,
            only_hash: options.only_hash,
            cancel: cancel.clone(),
        };
        let pin = options.pin && !options.only_hash;
        let mut root = DirBuilder::default();
        let mut entries = Box::pin(entries);

        while let Some(entry) = cancel.run(async { Ok(entries.next().await) }).await? {
            let segments = normalize(&entry.path)?;

            match entry.content {
                ImportContent::Directory => {
                    root.insert_dir(&segments, entry.mode, entry.mtime)?;
                }
                ImportContent::File(reader) => {
                    let params = FileParams {
                        mode: entry.mode,
                        mtime: entry.mtime,
                        ..settings.file
                    };
                    let progress = options.progress.as_ref().map(|p| (p, entry.path.as_str()));
                    let file = build_file(&writer, options.chunker.chunks(reader), &params, progress).await?;

                    let result = AddResult {
                        path: if segments.is_empty() { file.cid.to_string() } else { segments.join("/") },
                        cid: file.cid,
                        mode: entry.mode.unwrap_or(DEFAULT_FILE_MODE),
                        mtime: entry.mtime,
                        size: file.tsize,
                    };
                    debug!(path = %result.path, cid = %result.cid, "imported file");

                    if !segments.is_empty() {
                        root.insert_file(&segments, file)?;
                    }
                    if pin && !options.wrap_with_directory && result.is_top_level() {
                        pins.pin_imported(&result.cid).await?;
                    }
                    yield result;
                }
            }
        }

        let mut dirs = vec![];
        if options.wrap_with_directory {
            let result = root.flush(&writer, &settings.dir, String::new(), &mut dirs).await?;
            dirs.push(result);
        } else {
            root.flush_entries(&writer, &settings.dir, String::new(), &mut dirs).await?;
        }

        for result in dirs {
            if pin && result.is_top_level() {
                pins.pin_imported(&result.cid).await?;
            }
            debug!(path = %result.path, cid = %result.cid, "imported directory");
            yield result;
        }
    })
}

/// Imports a single stream of bytes, returning the last result.
pub async fn add<R>(
    store: Arc<dyn BlockStore>,
    protector: Arc<Protector>,
    pins: Arc<PinManager>,
    content: R,
    options: AddOptions,
) -> Result<AddResult, Error>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let entries = futures::stream::iter([ImportEntry::file("", content)]);
    let results: Vec<AddResult> = add_all(store, protector, pins, entries, options)
        .try_collect()
        .await?;
    results
        .into_iter()
        .last()
        .ok_or_else(|| Error::InvalidRequest("nothing was imported".to_string()))
}
