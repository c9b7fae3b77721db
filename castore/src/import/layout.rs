//! Arranges the leaves of a file into a DAG.

use std::collections::VecDeque;

use bytes::Bytes;
use cid::Cid;
use futures::{future::BoxFuture, stream::BoxStream, StreamExt};

use super::{writer::BlockWriter, ProgressFn};
use crate::codec::{DataType, Mtime, PbLink, PbNode, UnixFs};
use crate::Error;

pub const DEFAULT_MAX_CHILDREN: usize = 174;
pub const DEFAULT_LAYER_REPEAT: usize = 4;

/// A node of a file DAG as seen from its parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FileChild {
    pub cid: Cid,
    /// Cumulative size of the encoded DAG.
    pub tsize: u64,
    /// Bytes of file content below the node.
    pub file_size: u64,
}

pub(crate) struct FileParams {
    pub raw_leaves: bool,
    pub trickle: bool,
    pub max_children: usize,
    pub layer_repeat: usize,
    pub mode: Option<u32>,
    pub mtime: Option<Mtime>,
}

/// Turns chunks into stored leaves on demand, with one chunk of lookahead.
struct Leaves<'a> {
    chunks: BoxStream<'static, Result<Bytes, Error>>,
    pending: VecDeque<Bytes>,
    writer: &'a BlockWriter,
    raw_leaves: bool,
    progress: Option<(&'a ProgressFn, &'a str)>,
    processed: u64,
}

impl Leaves<'_> {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        if let Some(chunk) = self.pending.pop_front() {
            return Ok(Some(chunk));
        }
        let chunks = &mut self.chunks;
        let chunk = self
            .writer
            .cancel
            .run(async move { chunks.next().await.transpose() })
            .await?;

        if let (Some(chunk), Some((progress, path))) = (&chunk, self.progress) {
            self.processed += chunk.len() as u64;
            progress(self.processed, path);
        }
        Ok(chunk)
    }

    /// Whether all chunks were consumed.
    async fn is_done(&mut self) -> Result<bool, Error> {
        if self.pending.is_empty() {
            if let Some(chunk) = self.next_chunk().await? {
                self.pending.push_back(chunk);
            }
        }
        Ok(self.pending.is_empty())
    }

    async fn next_leaf(&mut self) -> Result<Option<FileChild>, Error> {
        let Some(chunk) = self.next_chunk().await? else {
            return Ok(None);
        };
        let file_size = chunk.len() as u64;

        let (cid, tsize) = if self.raw_leaves {
            self.writer.put_raw(chunk).await?
        } else {
            let node = PbNode {
                data: Some(UnixFs::file(chunk).encode()),
                links: vec![],
            };
            self.writer.put_pb(&node).await?
        };

        Ok(Some(FileChild {
            cid,
            tsize,
            file_size,
        }))
    }
}

/// Chunks are turned into leaves, which are then laid out balanced or as
/// a trickle DAG. A file made of a single chunk is that leaf alone, wrapped
/// into a UnixFS node if it carries metadata.
pub(crate) async fn build_file(
    writer: &BlockWriter,
    chunks: BoxStream<'static, Result<Bytes, Error>>,
    params: &FileParams,
    progress: Option<(&ProgressFn, &str)>,
) -> Result<FileChild, Error> {
    let mut leaves = Leaves {
        chunks,
        pending: VecDeque::new(),
        writer,
        raw_leaves: params.raw_leaves,
        progress,
        processed: 0,
    };

    let first = leaves.next_chunk().await?.unwrap_or_default();
    if leaves.is_done().await? {
        return single_leaf(writer, first, params).await;
    }
    leaves.pending.push_front(first);

    if params.trickle {
        fill_trickle(&mut leaves, params, None).await
    } else {
        balanced(&mut leaves, params).await
    }
}

async fn single_leaf(
    writer: &BlockWriter,
    data: Bytes,
    params: &FileParams,
) -> Result<FileChild, Error> {
    let file_size = data.len() as u64;
    let has_metadata = params.mode.is_some() || params.mtime.is_some();

    let (cid, tsize) = if params.raw_leaves && !has_metadata {
        writer.put_raw(data).await?
    } else {
        let node = PbNode {
            data: Some(
                UnixFs::file(data)
                    .with_metadata(params.mode, params.mtime)
                    .encode(),
            ),
            links: vec![],
        };
        writer.put_pb(&node).await?
    };

    Ok(FileChild {
        cid,
        tsize,
        file_size,
    })
}

/// Creates the node linking `children`. Children without content are
/// dropped.
async fn parent(
    writer: &BlockWriter,
    children: Vec<FileChild>,
    params: &FileParams,
) -> Result<FileChild, Error> {
    let mut unixfs = UnixFs::new(DataType::File).with_metadata(params.mode, params.mtime);
    let mut links = Vec::with_capacity(children.len());

    for child in children.into_iter().filter(|c| c.file_size > 0) {
        unixfs.blocksizes.push(child.file_size);
        links.push(PbLink::new(child.cid, "", child.tsize));
    }

    let file_size = unixfs.file_size()?;
    let node = PbNode {
        data: Some(unixfs.encode()),
        links,
    };
    let (cid, tsize) = writer.put_pb(&node).await?;

    Ok(FileChild {
        cid,
        tsize,
        file_size,
    })
}

/// Groups of `max_children` nodes are reduced into parents, level by level,
/// until one node remains.
///
/// Every level is flushed as soon as it fills up, so only one partial group
/// per level is held in memory.
async fn balanced(leaves: &mut Leaves<'_>, params: &FileParams) -> Result<FileChild, Error> {
    let writer = leaves.writer;
    let mut levels: Vec<Vec<FileChild>> = vec![];

    while let Some(leaf) = leaves.next_leaf().await? {
        push_level(writer, params, &mut levels, 0, leaf).await?;
    }

    let mut level = 0;
    loop {
        let items = std::mem::take(&mut levels[level]);
        let higher = levels[level + 1..].iter().any(|l| !l.is_empty());

        match items.len() {
            0 => {}
            1 if level > 0 && !higher => return Ok(items[0]),
            _ => {
                let node = parent(writer, items, params).await?;
                push_level(writer, params, &mut levels, level + 1, node).await?;
            }
        }
        level += 1;
    }
}

async fn push_level(
    writer: &BlockWriter,
    params: &FileParams,
    levels: &mut Vec<Vec<FileChild>>,
    mut level: usize,
    mut node: FileChild,
) -> Result<(), Error> {
    loop {
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(node);
        if levels[level].len() < params.max_children {
            return Ok(());
        }
        let group = std::mem::take(&mut levels[level]);
        node = parent(writer, group, params).await?;
        level += 1;
    }
}

/// Fills `node` with up to `max_children` leaves, then appends
/// `layer_repeat` subtrees of each depth below `max_depth`, growing the
/// depth without bound at the root.
fn fill_trickle<'a, 'w>(
    leaves: &'a mut Leaves<'w>,
    params: &'a FileParams,
    max_depth: Option<usize>,
) -> BoxFuture<'a, Result<FileChild, Error>>
where
    'w: 'a,
{
    Box::pin(async move {
        let mut children = Vec::new();
        while children.len() < params.max_children {
            match leaves.next_leaf().await? {
                Some(leaf) => children.push(leaf),
                None => break,
            }
        }

        let mut depth = 1;
        'depths: while max_depth.map_or(true, |max| depth < max) {
            for _ in 0..params.layer_repeat {
                if leaves.is_done().await? {
                    break 'depths;
                }
                children.push(fill_trickle(leaves, params, Some(depth)).await?);
            }
            depth += 1;
        }

        parent(leaves.writer, children, params).await
    })
}
