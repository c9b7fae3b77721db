//! Assembles imported files into UnixFS directories.

use std::collections::BTreeMap;

use cid::Cid;
use futures::future::BoxFuture;

use super::{layout::FileChild, writer::BlockWriter, AddResult};
use crate::codec::{unixfs::DEFAULT_DIRECTORY_MODE, Mtime, PbLink, PbNode, UnixFs};
use crate::unixfs::hamt::{HashBits, Layout};
use crate::Error;

pub const DEFAULT_SHARD_SPLIT_THRESHOLD: usize = 1000;

pub(crate) struct DirParams {
    /// Set when large directories get sharded.
    pub shard_layout: Option<Layout>,
    pub shard_split_threshold: usize,
}

/// Splits an entry path into its components. Empty and `.` components are
/// dropped, `..` is rejected.
pub(crate) fn normalize(path: &str) -> Result<Vec<String>, Error> {
    let mut segments = vec![];
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(Error::InvalidRequest(format!(
                    "path {:?} must not contain ..",
                    path
                )))
            }
            s => segments.push(s.to_string()),
        }
    }
    Ok(segments)
}

enum Entry {
    File(FileChild),
    Dir(DirBuilder),
}

/// A directory being populated. Entries keep the order they were first
/// added in.
#[derive(Default)]
pub(crate) struct DirBuilder {
    mode: Option<u32>,
    mtime: Option<Mtime>,
    entries: Vec<(String, Entry)>,
}

impl DirBuilder {
    /// Returns the subdirectory `name`, creating it if needed.
    fn subdir(&mut self, name: &str) -> Result<&mut DirBuilder, Error> {
        let idx = match self.entries.iter().position(|(n, _)| n == name) {
            Some(idx) => idx,
            None => {
                self.entries
                    .push((name.to_string(), Entry::Dir(DirBuilder::default())));
                self.entries.len() - 1
            }
        };
        match &mut self.entries[idx].1 {
            Entry::Dir(dir) => Ok(dir),
            Entry::File(_) => Err(Error::InvalidRequest(format!(
                "{} is a file, not a directory",
                name
            ))),
        }
    }

    fn walk(&mut self, segments: &[String]) -> Result<&mut DirBuilder, Error> {
        let mut dir = self;
        for segment in segments {
            dir = dir.subdir(segment)?;
        }
        Ok(dir)
    }

    /// Places a file at `segments`, creating parents as needed. A file
    /// already at that path is replaced.
    pub(crate) fn insert_file(&mut self, segments: &[String], file: FileChild) -> Result<(), Error> {
        let Some((name, parents)) = segments.split_last() else {
            return Err(Error::InvalidRequest("file entry without a name".to_string()));
        };
        let dir = self.walk(parents)?;

        match dir.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, Entry::Dir(_))) => Err(Error::InvalidRequest(format!(
                "{} is a directory, not a file",
                segments.join("/")
            ))),
            Some((_, entry)) => {
                *entry = Entry::File(file);
                Ok(())
            }
            None => {
                dir.entries.push((name.clone(), Entry::File(file)));
                Ok(())
            }
        }
    }

    /// Declares a directory at `segments`, applying its metadata.
    pub(crate) fn insert_dir(
        &mut self,
        segments: &[String],
        mode: Option<u32>,
        mtime: Option<Mtime>,
    ) -> Result<(), Error> {
        if segments.is_empty() {
            return Err(Error::InvalidRequest(
                "directory entry without a path".to_string(),
            ));
        }
        let dir = self.walk(segments)?;
        dir.mode = mode;
        dir.mtime = mtime;
        Ok(())
    }

    /// Stores every subdirectory below this one, children first, appending
    /// a result for each to `out`. Returns this directory's links.
    pub(crate) fn flush_entries<'a>(
        self,
        writer: &'a BlockWriter,
        params: &'a DirParams,
        path: String,
        out: &'a mut Vec<AddResult>,
    ) -> BoxFuture<'a, Result<Vec<(String, Cid, u64)>, Error>> {
        Box::pin(async move {
            let mut links = Vec::with_capacity(self.entries.len());
            for (name, entry) in self.entries {
                match entry {
                    Entry::File(file) => links.push((name, file.cid, file.tsize)),
                    Entry::Dir(dir) => {
                        let child_path = if path.is_empty() {
                            name.clone()
                        } else {
                            format!("{}/{}", path, name)
                        };
                        let result = dir.flush(writer, params, child_path, out).await?;
                        links.push((name, result.cid, result.size));
                        out.push(result);
                    }
                }
            }
            Ok(links)
        })
    }

    /// Stores this directory and everything below it.
    pub(crate) async fn flush(
        self,
        writer: &BlockWriter,
        params: &DirParams,
        path: String,
        out: &mut Vec<AddResult>,
    ) -> Result<AddResult, Error> {
        let (mode, mtime) = (self.mode, self.mtime);
        let links = self.flush_entries(writer, params, path.clone(), out).await?;

        let (cid, size) = match params.shard_layout {
            Some(layout) if links.len() > params.shard_split_threshold => {
                let entries = links
                    .into_iter()
                    .map(|(name, cid, tsize)| ShardEntry {
                        bits: HashBits::new(&name),
                        name,
                        cid,
                        tsize,
                    })
                    .collect();
                build_shard(writer, layout, entries, Some((mode, mtime))).await?
            }
            _ => {
                let node = PbNode {
                    data: Some(UnixFs::directory().with_metadata(mode, mtime).encode()),
                    links: links
                        .into_iter()
                        .map(|(name, cid, tsize)| PbLink::new(cid, name, tsize))
                        .collect(),
                };
                writer.put_pb(&node).await?
            }
        };

        Ok(AddResult {
            path,
            cid,
            mode: mode.unwrap_or(DEFAULT_DIRECTORY_MODE),
            mtime,
            size,
        })
    }
}

struct ShardEntry {
    name: String,
    bits: HashBits,
    cid: Cid,
    tsize: u64,
}

/// Stores one shard level. Slots holding a single entry link to it
/// directly, slots with more entries get a child shard. Only the root shard
/// carries the directory's metadata.
fn build_shard<'a>(
    writer: &'a BlockWriter,
    layout: Layout,
    entries: Vec<ShardEntry>,
    metadata: Option<(Option<u32>, Option<Mtime>)>,
) -> BoxFuture<'a, Result<(Cid, u64), Error>> {
    Box::pin(async move {
        let mut slots: BTreeMap<usize, Vec<ShardEntry>> = BTreeMap::new();
        for mut entry in entries {
            let slot = entry.bits.next(layout.bits)?;
            slots.entry(slot).or_default().push(entry);
        }

        let bitfield = layout.bitfield(slots.keys().copied());
        let mut links = Vec::with_capacity(slots.len());

        for (slot, mut group) in slots {
            let prefix = layout.prefix(slot);
            if group.len() == 1 {
                if let Some(entry) = group.pop() {
                    links.push(PbLink::new(
                        entry.cid,
                        format!("{}{}", prefix, entry.name),
                        entry.tsize,
                    ));
                }
            } else {
                let (cid, tsize) = build_shard(writer, layout, group, None).await?;
                links.push(PbLink::new(cid, prefix, tsize));
            }
        }

        let mut unixfs = UnixFs::hamt_shard(bitfield, layout.fanout);
        if let Some((mode, mtime)) = metadata {
            unixfs = unixfs.with_metadata(mode, mtime);
        }
        writer
            .put_pb(&PbNode {
                data: Some(unixfs.encode()),
                links,
            })
            .await
    })
}
