//! Reads UnixFS DAGs back: file contents and directory listings.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_stream::stream;
use bytes::Bytes;
use cid::Cid;
use futures::{stream::BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::blockstore::BlockStore;
use crate::cancel::Cancellation;
use crate::codec::{unixfs::DEFAULT_FILE_MODE, DataType, Mtime, Node, PbLink, PbNode, UnixFs};
use crate::resolver::{load, resolve, IpfsPath, ResolvedValue};
use crate::Error;

pub mod hamt;

use hamt::{Layout, ShardLink};

/// Splits a file node into its own content and its children, with the
/// number of content bytes below each child.
fn file_parts(cid: &Cid, node: Node) -> Result<(Bytes, Vec<(Cid, u64)>), Error> {
    let pb = match node {
        Node::Raw(data) => return Ok((data, vec![])),
        Node::DagPb(pb) => pb,
        Node::DagCbor(_) => {
            return Err(Error::InvalidRequest(format!(
                "{} is dag-cbor, not a file",
                cid
            )))
        }
    };

    let unixfs = unixfs_of(cid, &pb)?;
    match unixfs.kind {
        DataType::File | DataType::Raw => {}
        kind if kind.is_directory() => {
            return Err(Error::InvalidRequest(format!("{} is a directory", cid)))
        }
        kind => {
            return Err(Error::InvalidRequest(format!(
                "{} is a {}, not a file",
                cid,
                kind.as_str()
            )))
        }
    }

    if unixfs.blocksizes.len() != pb.links.len() {
        return Err(Error::MalformedNode(format!(
            "{} has {} links but {} blocksizes",
            cid,
            pb.links.len(),
            unixfs.blocksizes.len()
        )));
    }

    let children = pb
        .links
        .iter()
        .zip(unixfs.blocksizes)
        .map(|(link, size)| (link.cid, size))
        .collect();
    Ok((unixfs.data.unwrap_or_default(), children))
}

fn unixfs_of(cid: &Cid, pb: &PbNode) -> Result<UnixFs, Error> {
    match pb.unixfs() {
        Some(res) => res,
        None => Err(Error::InvalidRequest(format!(
            "{} is not a unixfs node",
            cid
        ))),
    }
}

fn overflow(cid: &Cid) -> Error {
    Error::MalformedNode(format!("{} has blocksizes overflowing the file size", cid))
}

enum Pending {
    Loaded(Cid, Node),
    Link(Cid),
}

/// Streams `length` bytes (or everything) of the file at `path`, starting at
/// `offset`.
///
/// Subtrees entirely before `offset` or past the end are never loaded.
pub fn cat(
    store: Arc<dyn BlockStore>,
    path: IpfsPath,
    offset: u64,
    length: Option<u64>,
    cancel: Cancellation,
) -> BoxStream<'static, Result<Bytes, Error>> {
    Box::pin(stream! {
        let resolved = match cancel.run(resolve(store.as_ref(), &path.root, &path.remainder(), false)).await {
            Ok(resolved) => resolved,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        let ResolvedValue::Node(node) = resolved.value else {
            yield Err(Error::InvalidRequest(format!("{} is not a file", path)));
            return;
        };

        let end = length.map(|l| offset.saturating_add(l));
        let mut stack = vec![(Pending::Loaded(resolved.cid, node), 0u64)];

        while let Some((pending, start)) = stack.pop() {
            let (cid, node) = match pending {
                Pending::Loaded(cid, node) => (cid, node),
                Pending::Link(cid) => match cancel.run(load(store.as_ref(), &cid)).await {
                    Ok(node) => (cid, node),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                },
            };
            let (content, children) = match file_parts(&cid, node) {
                Ok(parts) => parts,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let Some(content_end) = start.checked_add(content.len() as u64) else {
                yield Err(overflow(&cid));
                return;
            };
            let from = offset.max(start);
            let to = end.map_or(content_end, |e| e.min(content_end));
            if from < to {
                yield Ok(content.slice((from - start) as usize..(to - start) as usize));
            }

            let mut pos = content_end;
            let mut next = vec![];
            for (child, size) in children {
                let Some(child_end) = pos.checked_add(size) else {
                    yield Err(overflow(&cid));
                    return;
                };
                if child_end > offset && end.map_or(true, |e| pos < e) {
                    next.push((Pending::Link(child), pos));
                }
                pos = child_end;
            }
            stack.extend(next.into_iter().rev());
        }
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Dir,
    Symlink,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LsEntry {
    pub name: String,
    pub path: String,
    pub cid: Cid,
    /// Bytes of content: the file size, the length of a symlink target, 0
    /// for directories.
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: EntryType,
    pub mode: u32,
    pub mtime: Option<Mtime>,
    /// 0 for the listed path itself, 1 for its entries, and so on.
    pub depth: usize,
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LsOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CatOptions {
    pub offset: u64,
    /// Read until the end of the file if unset.
    pub length: Option<u64>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

/// Describes `node` as a listing entry, also returning its UnixFS data if it
/// is a directory.
fn describe(
    cid: &Cid,
    node: &Node,
    name: String,
    path: String,
    depth: usize,
) -> Result<(LsEntry, Option<UnixFs>), Error> {
    let entry = |kind, size, mode, mtime| LsEntry {
        name,
        path,
        cid: *cid,
        size,
        kind,
        mode,
        mtime,
        depth,
    };

    match node {
        Node::Raw(data) => Ok((
            entry(EntryType::File, data.len() as u64, DEFAULT_FILE_MODE, None),
            None,
        )),
        Node::DagCbor(_) => Err(Error::InvalidRequest(format!(
            "{} is dag-cbor, not a unixfs node",
            cid
        ))),
        Node::DagPb(pb) => {
            let unixfs = unixfs_of(cid, pb)?;
            let kind = match unixfs.kind {
                k if k.is_directory() => EntryType::Dir,
                DataType::Symlink => EntryType::Symlink,
                _ => EntryType::File,
            };
            let (mode, mtime) = (unixfs.mode(), unixfs.mtime);
            let size = match kind {
                EntryType::Dir => 0,
                _ => unixfs.file_size().map_err(|_| overflow(cid))?,
            };
            let dir = (kind == EntryType::Dir).then_some(unixfs);
            Ok((entry(kind, size, mode, mtime), dir))
        }
    }
}

/// The entries of a directory node, flattening sharded directories.
async fn dir_entries(
    store: &dyn BlockStore,
    pb: &PbNode,
    unixfs: &UnixFs,
) -> Result<VecDeque<(String, Cid)>, Error> {
    if unixfs.kind != DataType::HamtShard {
        return Ok(pb
            .links
            .iter()
            .map(|l| (l.name.clone().unwrap_or_default(), l.cid))
            .collect());
    }

    let mut out = VecDeque::new();
    let mut stack: Vec<(VecDeque<PbLink>, Layout)> =
        vec![(pb.links.clone().into(), Layout::from_node(unixfs)?)];
    while let Some((links, layout)) = stack.last_mut() {
        let Some(link) = links.pop_front() else {
            stack.pop();
            continue;
        };
        let layout = *layout;

        match hamt::parse_link_name(&layout, link.name.as_deref().unwrap_or_default())? {
            (_, ShardLink::Entry(name)) => out.push_back((name.to_string(), link.cid)),
            (_, ShardLink::Shard) => {
                let Node::DagPb(child) = load(store, &link.cid).await? else {
                    return Err(Error::MalformedNode(format!(
                        "hamt shard links to non dag-pb block {}",
                        link.cid
                    )));
                };
                let layout = Layout::from_node(&unixfs_of(&link.cid, &child)?)?;
                stack.push((child.links.into(), layout));
            }
        }
    }
    Ok(out)
}

/// Lists the directory at `path`, or describes the file at `path`.
///
/// Entries of sharded directories come in shard order, with the slot
/// prefixes stripped from their names. With `recursive`, every
/// subdirectory's entries follow right after the subdirectory itself. An
/// entry that can't be loaded is reported in-band and skipped.
pub fn ls(
    store: Arc<dyn BlockStore>,
    path: IpfsPath,
    options: LsOptions,
    cancel: Cancellation,
) -> BoxStream<'static, Result<LsEntry, Error>> {
    walk(store, path, options.recursive, false, cancel)
}

/// Walks the tree below `path`, yielding the entry for `path` itself first
/// if it's a file, or if `with_root` is set.
fn walk(
    store: Arc<dyn BlockStore>,
    path: IpfsPath,
    recursive: bool,
    with_root: bool,
    cancel: Cancellation,
) -> BoxStream<'static, Result<LsEntry, Error>> {
    Box::pin(stream! {
        let resolved = match cancel.run(resolve(store.as_ref(), &path.root, &path.remainder(), false)).await {
            Ok(resolved) => resolved,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        let ResolvedValue::Node(node) = resolved.value else {
            yield Err(Error::InvalidRequest(format!("{} is not a unixfs node", path)));
            return;
        };

        let base = match path.segments.is_empty() {
            true => path.root.to_string(),
            false => format!("{}/{}", path.root, path.remainder()),
        };
        let name = path.segments.last().cloned().unwrap_or_else(|| path.root.to_string());

        let (entry, dir) = match describe(&resolved.cid, &node, name, base.clone(), 0) {
            Ok(described) => described,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        let (Some(unixfs), Node::DagPb(pb)) = (dir, &node) else {
            yield Ok(entry);
            return;
        };
        if with_root {
            yield Ok(entry);
        }

        let entries = match cancel.run(dir_entries(store.as_ref(), pb, &unixfs)).await {
            Ok(entries) => entries,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        let mut stack = vec![(base, 1usize, entries)];

        while let Some((prefix, depth, entries)) = stack.last_mut() {
            let Some((name, cid)) = entries.pop_front() else {
                stack.pop();
                continue;
            };
            let (prefix, depth) = (prefix.clone(), *depth);

            let node = match cancel.run(load(store.as_ref(), &cid)).await {
                Ok(node) => node,
                Err(e @ (Error::Cancelled | Error::TimedOut)) => {
                    yield Err(e);
                    return;
                }
                Err(e) => {
                    warn!(%cid, err = %e, "unable to load directory entry");
                    yield Err(e);
                    continue;
                }
            };

            let entry_path = format!("{}/{}", prefix, name);
            match describe(&cid, &node, name, entry_path.clone(), depth) {
                Ok((entry, dir)) => {
                    yield Ok(entry);
                    if let (true, Some(unixfs), Node::DagPb(pb)) = (recursive, dir, &node) {
                        match cancel.run(dir_entries(store.as_ref(), pb, &unixfs)).await {
                            Ok(entries) => stack.push((entry_path, depth + 1, entries)),
                            Err(e) => yield Err(e),
                        }
                    }
                }
                Err(e) => yield Err(e),
            }
        }
    })
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GetOptions {
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

/// One exported entry. Files carry their content as a stream that only
/// starts reading once polled.
pub struct GetEntry {
    pub path: String,
    pub cid: Cid,
    pub kind: EntryType,
    pub mode: u32,
    pub mtime: Option<Mtime>,
    pub content: Option<BoxStream<'static, Result<Bytes, Error>>>,
}

impl std::fmt::Debug for GetEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetEntry")
            .field("path", &self.path)
            .field("cid", &self.cid)
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .field("mtime", &self.mtime)
            .finish_non_exhaustive()
    }
}

/// Exports the file or directory tree at `path`.
///
/// Directories come before their entries. Paths start with `path` itself,
/// as given. Entries that can't be loaded are reported in-band.
pub fn get(
    store: Arc<dyn BlockStore>,
    path: IpfsPath,
    cancel: Cancellation,
) -> BoxStream<'static, Result<GetEntry, Error>> {
    let entries = walk(store.clone(), path, true, true, cancel.clone());

    Box::pin(entries.map(move |res| {
        let entry = res?;
        let content = (entry.kind == EntryType::File)
            .then(|| cat(store.clone(), entry.cid.into(), 0, None, cancel.clone()));
        Ok(GetEntry {
            path: entry.path,
            cid: entry.cid,
            kind: entry.kind,
            mode: entry.mode,
            mtime: entry.mtime,
            content,
        })
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use futures::{StreamExt, TryStreamExt};
    use rstest::rstest;

    use super::{cat, get, ls, EntryType, GetEntry, LsEntry, LsOptions};
    use crate::blockstore::{BlockStore, MemoryBlockStore};
    use crate::cancel::Cancellation;
    use crate::codec::{DataType, Node, PbLink, PbNode, UnixFs};
    use crate::fixtures::{put_abc_tree, put_cbor, put_node, put_raw};
    use crate::resolver::IpfsPath;
    use crate::Error;

    async fn cat_range(
        store: Arc<dyn BlockStore>,
        path: IpfsPath,
        offset: u64,
        length: Option<u64>,
    ) -> Result<Vec<u8>, Error> {
        let chunks: Vec<Bytes> = cat(store, path, offset, length, Cancellation::default())
            .try_collect()
            .await?;
        Ok(chunks.concat())
    }

    #[tokio::test]
    async fn cat_raw_through_directories() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let (root, _) = put_abc_tree(store.as_ref()).await;
        let path: IpfsPath = format!("/ipfs/{}/a/b/c", root).parse().unwrap();

        assert_eq!(b"c".to_vec(), cat_range(store, path, 0, None).await.unwrap());
    }

    #[tokio::test]
    async fn cat_directory_fails() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let (root, _) = put_abc_tree(store.as_ref()).await;
        let path: IpfsPath = format!("{}/a", root).parse().unwrap();

        assert!(matches!(
            cat_range(store, path, 0, None).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn cat_dag_cbor_fails() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let cid = put_cbor(store.as_ref(), vec![]).await;

        assert!(matches!(
            cat_range(store, cid.into(), 0, None).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    /// A file with `"012"` inline and raw leaves `"345"` and `"6789"`.
    async fn put_split_file(store: &dyn BlockStore) -> cid::Cid {
        let a = put_raw(store, b"345").await;
        let b = put_raw(store, b"6789").await;
        let mut unixfs = UnixFs::file(Bytes::from_static(b"012"));
        unixfs.blocksizes = vec![3, 4];
        let node = Node::DagPb(PbNode {
            data: Some(unixfs.encode()),
            links: vec![PbLink::new(a.0, "", a.1), PbLink::new(b.0, "", b.1)],
        });
        put_node(store, &node).await.0
    }

    #[rstest]
    #[case::everything(0, None, "0123456789")]
    #[case::offset(3, None, "3456789")]
    #[case::window(3, Some(4), "3456")]
    #[case::across_leaves(1, Some(8), "12345678")]
    #[case::past_end(20, None, "")]
    #[case::zero_length(2, Some(0), "")]
    #[tokio::test]
    async fn cat_ranges(#[case] offset: u64, #[case] length: Option<u64>, #[case] expected: &str) {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let file = put_split_file(store.as_ref()).await;

        assert_eq!(
            expected.as_bytes().to_vec(),
            cat_range(store, file.into(), offset, length).await.unwrap()
        );
    }

    #[tokio::test]
    async fn cat_blocksizes_mismatch() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let (leaf, size) = put_raw(store.as_ref(), b"x").await;
        let node = Node::DagPb(PbNode {
            data: Some(UnixFs::new(DataType::File).encode()),
            links: vec![PbLink::new(leaf, "", size)],
        });
        let (file, _) = put_node(store.as_ref(), &node).await;

        assert!(matches!(
            cat_range(store, file.into(), 0, None).await,
            Err(Error::MalformedNode(_))
        ));
    }

    #[tokio::test]
    async fn ls_directory() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let (root, nodes) = put_abc_tree(store.as_ref()).await;
        let path: IpfsPath = format!("{}/a", root).parse().unwrap();

        let entries: Vec<LsEntry> = ls(store, path, LsOptions::default(), Cancellation::default())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(
            vec![
                LsEntry {
                    name: "b".to_string(),
                    path: format!("{}/a/b", root),
                    cid: nodes["a/b"],
                    size: 0,
                    kind: EntryType::Dir,
                    mode: 0o755,
                    mtime: None,
                    depth: 1,
                },
                LsEntry {
                    name: "d".to_string(),
                    path: format!("{}/a/d", root),
                    cid: nodes["a/d"],
                    size: 1,
                    kind: EntryType::File,
                    mode: 0o644,
                    mtime: None,
                    depth: 1,
                },
            ],
            entries
        );
    }

    #[tokio::test]
    async fn ls_recursive() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let (root, _) = put_abc_tree(store.as_ref()).await;

        let entries: Vec<(String, usize)> = ls(
            store,
            root.into(),
            LsOptions {
                recursive: true,
                ..Default::default()
            },
            Cancellation::default(),
        )
        .map(|e| e.map(|e| (e.name, e.depth)).unwrap())
        .collect()
        .await;
        assert_eq!(
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 2),
                ("c".to_string(), 3),
                ("d".to_string(), 2)
            ],
            entries
        );
    }

    #[tokio::test]
    async fn ls_file_is_itself() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let (root, nodes) = put_abc_tree(store.as_ref()).await;
        let path: IpfsPath = format!("{}/a/d", root).parse().unwrap();

        let entries: Vec<LsEntry> = ls(store, path, LsOptions::default(), Cancellation::default())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(1, entries.len());
        assert_eq!("d", entries[0].name);
        assert_eq!(nodes["a/d"], entries[0].cid);
        assert_eq!(0, entries[0].depth);
    }

    #[tokio::test]
    async fn ls_missing_entry_in_band() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let (root, nodes) = put_abc_tree(store.as_ref()).await;
        store.delete(&nodes["a/b"]).await.unwrap();
        let path: IpfsPath = format!("{}/a", root).parse().unwrap();

        let results: Vec<_> = ls(store, path, LsOptions::default(), Cancellation::default())
            .collect()
            .await;
        assert_eq!(2, results.len());
        assert_eq!(Err(Error::NotFound(nodes["a/b"])), results[0]);
        assert_eq!(nodes["a/d"], results[1].as_ref().unwrap().cid);
    }

    /// A file whose blocksizes sum past u64::MAX.
    async fn put_oversized_file(store: &dyn BlockStore) -> cid::Cid {
        let a = put_raw(store, b"a").await;
        let b = put_raw(store, b"b").await;
        let mut unixfs = UnixFs::new(DataType::File);
        unixfs.blocksizes = vec![u64::MAX, 1];
        let node = Node::DagPb(PbNode {
            data: Some(unixfs.encode()),
            links: vec![PbLink::new(a.0, "", a.1), PbLink::new(b.0, "", b.1)],
        });
        put_node(store, &node).await.0
    }

    #[tokio::test]
    async fn oversized_file_is_malformed() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let file = put_oversized_file(store.as_ref()).await;

        assert!(matches!(
            cat_range(store.clone(), file.into(), 0, None).await,
            Err(Error::MalformedNode(_))
        ));

        let results: Vec<_> = ls(
            store.clone(),
            file.into(),
            LsOptions::default(),
            Cancellation::default(),
        )
        .collect()
        .await;
        assert_eq!(1, results.len());
        assert!(matches!(results[0], Err(Error::MalformedNode(_))));

        // as a directory entry, it's reported in-band.
        let dir = crate::fixtures::put_directory(store.as_ref(), &[("big", (file, 0))]).await;
        let results: Vec<_> = ls(store, dir.0.into(), LsOptions::default(), Cancellation::default())
            .collect()
            .await;
        assert_eq!(1, results.len());
        assert!(matches!(results[0], Err(Error::MalformedNode(_))));
    }

    async fn read_all(entry: &mut GetEntry) -> Option<Vec<u8>> {
        let content = entry.content.take()?;
        let chunks: Vec<Bytes> = content.try_collect().await.unwrap();
        Some(chunks.concat())
    }

    #[tokio::test]
    async fn get_exports_tree() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let (root, nodes) = put_abc_tree(store.as_ref()).await;

        let mut entries: Vec<GetEntry> = get(store, root.into(), Cancellation::default())
            .try_collect()
            .await
            .unwrap();

        let mut exported = vec![];
        for entry in entries.iter_mut() {
            let content = read_all(entry).await;
            exported.push((entry.path.clone(), entry.kind, entry.mode, content));
        }
        assert_eq!(
            vec![
                (root.to_string(), EntryType::Dir, 0o755, None),
                (format!("{}/a", root), EntryType::Dir, 0o755, None),
                (format!("{}/a/b", root), EntryType::Dir, 0o755, None),
                (format!("{}/a/b/c", root), EntryType::File, 0o644, Some(b"c".to_vec())),
                (format!("{}/a/d", root), EntryType::File, 0o644, Some(b"d".to_vec())),
            ],
            exported
        );
        assert_eq!(nodes["a/b/c"], entries[3].cid);
    }

    #[tokio::test]
    async fn get_single_file() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let file = put_split_file(store.as_ref()).await;

        let mut entries: Vec<GetEntry> = get(store, file.into(), Cancellation::default())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(1, entries.len());
        assert_eq!(file.to_string(), entries[0].path);
        assert_eq!(Some(b"0123456789".to_vec()), read_all(&mut entries[0]).await);
    }
}
