//! Walks paths through blocks of any supported format.

use bytes::Bytes;
use cid::Cid;
use ipld_core::ipld::Ipld;
use tracing::{instrument, trace};

use crate::blockstore::BlockStore;
use crate::codec::{self, dag_cbor, DataType, Node};
use crate::unixfs::hamt::{self, HashBits, Layout};
use crate::Error;

mod path;
mod tree;

pub use path::{split_segments, IpfsPath};
pub use tree::tree;

/// Fetches and decodes the block `cid`.
pub async fn load(store: &dyn BlockStore, cid: &Cid) -> Result<Node, Error> {
    let data: Bytes = store.get(cid).await?;
    codec::decode(cid.codec(), &data)
}

/// The value a path resolved to.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedValue {
    /// A whole block.
    Node(Node),
    /// A value inside a block.
    Ipld(Ipld),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    /// The block the value was found in, or the block a local resolve
    /// stepped to.
    pub cid: Cid,
    pub value: ResolvedValue,
    /// Segments left unconsumed, joined with `/`.
    pub remainder_path: String,
}

/// Result of resolving segments inside one block.
enum Walk {
    /// A link was reached after consuming `consumed` segments.
    Link { cid: Cid, consumed: usize },
    /// All segments were consumed without reaching a link.
    Value(Ipld),
    /// Segment `at` could not be matched.
    NotFound { at: usize },
}

/// Resolves `path` below `cid`.
///
/// With `local_resolve`, resolution stops right after the first link was
/// followed, returning its target as `cid` and the rest of the path as
/// `remainder_path`. Otherwise links are followed until the path is
/// exhausted, and a path ending on a link yields the linked block.
#[instrument(skip(store), fields(root = %cid), err)]
pub async fn resolve(
    store: &dyn BlockStore,
    cid: &Cid,
    path: &str,
    local_resolve: bool,
) -> Result<Resolved, Error> {
    let segments = split_segments(path);
    let mut current = *cid;
    let mut pos = 0;

    loop {
        let node = load(store, &current).await?;

        if pos == segments.len() {
            return Ok(Resolved {
                cid: current,
                value: ResolvedValue::Node(node),
                remainder_path: String::new(),
            });
        }

        match walk(store, &node, &segments[pos..]).await? {
            Walk::Link { cid: next, consumed } => {
                pos += consumed;
                trace!(from = %current, to = %next, "followed link");
                if local_resolve {
                    return Ok(Resolved {
                        cid: next,
                        value: ResolvedValue::Ipld(Ipld::Link(next)),
                        remainder_path: segments[pos..].join("/"),
                    });
                }
                current = next;
            }
            Walk::Value(value) => {
                return Ok(Resolved {
                    cid: current,
                    value: ResolvedValue::Ipld(value),
                    remainder_path: String::new(),
                })
            }
            Walk::NotFound { at } => {
                return Err(Error::PathNotFound {
                    cid: current,
                    remainder_path: segments[pos + at..].join("/"),
                })
            }
        }
    }
}

/// Consumes as many `segments` as possible inside `node`.
async fn walk(store: &dyn BlockStore, node: &Node, segments: &[String]) -> Result<Walk, Error> {
    let first = &segments[0];

    if let Node::DagPb(pb) = node {
        match node.unixfs() {
            Some(Ok(unixfs)) if unixfs.kind == DataType::HamtShard => {
                let layout = Layout::from_node(&unixfs)?;
                return Ok(match hamt_lookup(store, pb, &layout, first).await? {
                    Some(cid) => Walk::Link { cid, consumed: 1 },
                    None => Walk::NotFound { at: 0 },
                });
            }
            _ => {}
        }

        if let Some(link) = pb.links.iter().find(|l| l.name.as_deref() == Some(first.as_str())) {
            return Ok(Walk::Link {
                cid: link.cid,
                consumed: 1,
            });
        }

        // unnamed links can be addressed by their position.
        if let Ok(idx) = first.parse::<usize>() {
            if let Some(link) = pb.links.get(idx) {
                if link.name.as_deref().unwrap_or_default().is_empty() {
                    return Ok(Walk::Link {
                        cid: link.cid,
                        consumed: 1,
                    });
                }
            }
        }
    }

    let view = node.to_ipld();
    let mut value = &view;
    for (i, segment) in segments.iter().enumerate() {
        match dag_cbor::lookup(value, segment) {
            Some(Ipld::Link(cid)) => {
                return Ok(Walk::Link {
                    cid: *cid,
                    consumed: i + 1,
                })
            }
            Some(v) => value = v,
            None => return Ok(Walk::NotFound { at: i }),
        }
    }

    Ok(Walk::Value(value.clone()))
}

/// Finds `name` in the sharded directory rooted at `root`.
pub async fn hamt_lookup(
    store: &dyn BlockStore,
    root: &codec::PbNode,
    layout: &Layout,
    name: &str,
) -> Result<Option<Cid>, Error> {
    let mut bits = HashBits::new(name);
    let mut step = hamt::lookup_step(root, layout, &mut bits, name)?;

    loop {
        match step {
            hamt::Step::Found(cid) => return Ok(Some(cid)),
            hamt::Step::Missing => return Ok(None),
            hamt::Step::Descend(child) => {
                let Node::DagPb(pb) = load(store, &child).await? else {
                    return Err(Error::MalformedNode(format!(
                        "hamt shard {} links to a non dag-pb block",
                        child
                    )));
                };
                let unixfs = match pb.unixfs() {
                    Some(res) => res?,
                    None => {
                        return Err(Error::MalformedNode(format!(
                            "hamt shard {} has no data",
                            child
                        )))
                    }
                };
                let layout = Layout::from_node(&unixfs)?;
                step = hamt::lookup_step(&pb, &layout, &mut bits, name)?;
            }
        }
    }
}

/// Where a path through an IPFS namespace ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPath {
    /// The last CID reached by following links.
    pub cid: Cid,
    /// The part of the path below `cid` that addresses a value inside it.
    pub remainder_path: String,
}

/// Resolves an IPFS path to the last CID it reaches.
///
/// When `recursive` is false, only the first link is followed.
#[instrument(skip(store), fields(path = %path), err)]
pub async fn resolve_path(
    store: &dyn BlockStore,
    path: &IpfsPath,
    recursive: bool,
) -> Result<ResolvedPath, Error> {
    let mut cid = path.root;
    let mut remainder = path.remainder();

    while !remainder.is_empty() {
        let resolved = resolve(store, &cid, &remainder, true).await?;
        match resolved.value {
            ResolvedValue::Ipld(Ipld::Link(next)) => {
                cid = next;
                remainder = resolved.remainder_path;
                if !recursive {
                    break;
                }
            }
            // resolved to a value inside `cid`.
            _ => break,
        }
    }

    Ok(ResolvedPath {
        cid,
        remainder_path: remainder,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bytes::Bytes;
    use ipld_core::ipld::Ipld;

    use super::*;
    use crate::blockstore::MemoryBlockStore;
    use crate::fixtures::{put_abc_tree, put_cbor, put_raw};

    #[tokio::test]
    async fn resolve_directory_path() {
        let store = MemoryBlockStore::default();
        let (root, nodes) = put_abc_tree(&store).await;

        let resolved = resolve(&store, &root, "a/b/c", false).await.unwrap();
        assert_eq!(nodes["a/b/c"], resolved.cid);
        assert_eq!(
            ResolvedValue::Node(Node::Raw(Bytes::from_static(b"c"))),
            resolved.value
        );
        assert_eq!("", resolved.remainder_path);
    }

    #[tokio::test]
    async fn resolve_missing_segment() {
        let store = MemoryBlockStore::default();
        let (root, nodes) = put_abc_tree(&store).await;

        assert_eq!(
            Err(Error::PathNotFound {
                cid: nodes["a"],
                remainder_path: "c".to_string()
            }),
            resolve(&store, &root, "a/c", false).await
        );
        assert_eq!(
            Err(Error::PathNotFound {
                cid: nodes["a/b/c"],
                remainder_path: "x/y".to_string()
            }),
            resolve(&store, &root, "a/b/c/x/y", false).await
        );
    }

    #[tokio::test]
    async fn resolve_local_steps_once() {
        let store = MemoryBlockStore::default();
        let (root, nodes) = put_abc_tree(&store).await;

        let resolved = resolve(&store, &root, "a/b/c", true).await.unwrap();
        assert_eq!(nodes["a"], resolved.cid);
        assert_eq!("b/c", resolved.remainder_path);
    }

    #[tokio::test]
    async fn resolve_empty_path_is_root() {
        let store = MemoryBlockStore::default();
        let (cid, _) = put_raw(&store, b"x").await;
        let resolved = resolve(&store, &cid, "", false).await.unwrap();
        assert_eq!(cid, resolved.cid);
        assert_eq!(
            ResolvedValue::Node(Node::Raw(Bytes::from_static(b"x"))),
            resolved.value
        );
    }

    #[tokio::test]
    async fn resolve_missing_block() {
        let store = MemoryBlockStore::default();
        let cid = crate::fixtures::raw_cid(b"gone");
        assert_eq!(Err(Error::NotFound(cid)), resolve(&store, &cid, "", false).await);
    }

    /// Paths go through dag-cbor fields, across links into dag-pb.
    #[tokio::test]
    async fn resolve_across_formats() {
        let store = MemoryBlockStore::default();
        let (dir, nodes) = put_abc_tree(&store).await;
        let inner = put_cbor(&store, vec![("n", Ipld::Integer(7))]).await;
        let root = put_cbor(
            &store,
            vec![
                ("dir", Ipld::Link(dir)),
                (
                    "list",
                    Ipld::List(vec![Ipld::String("x".into()), Ipld::Link(inner)]),
                ),
            ],
        )
        .await;

        let resolved = resolve(&store, &root, "dir/a/d", false).await.unwrap();
        assert_eq!(nodes["a/d"], resolved.cid);

        let resolved = resolve(&store, &root, "list/1/n", false).await.unwrap();
        assert_eq!(inner, resolved.cid);
        assert_eq!(ResolvedValue::Ipld(Ipld::Integer(7)), resolved.value);

        let resolved = resolve(&store, &root, "list/0", false).await.unwrap();
        assert_eq!(root, resolved.cid);
        assert_eq!(ResolvedValue::Ipld(Ipld::String("x".into())), resolved.value);

        // dag-pb fields are addressable too.
        let resolved = resolve(&store, &root, "dir/Links/0/Name", false)
            .await
            .unwrap();
        assert_eq!(ResolvedValue::Ipld(Ipld::String("a".into())), resolved.value);
    }

    #[tokio::test]
    async fn resolve_ipfs_paths() {
        let store = MemoryBlockStore::default();
        let (dir, nodes) = put_abc_tree(&store).await;
        let root = put_cbor(
            &store,
            vec![(
                "m",
                Ipld::Map(BTreeMap::from([("dir".to_string(), Ipld::Link(dir))])),
            )],
        )
        .await;

        let path: IpfsPath = format!("/ipfs/{}/m/dir/a/b", root).parse().unwrap();
        assert_eq!(
            ResolvedPath {
                cid: nodes["a/b"],
                remainder_path: String::new()
            },
            resolve_path(&store, &path, true).await.unwrap()
        );
        assert_eq!(
            ResolvedPath {
                cid: dir,
                remainder_path: "a/b".to_string()
            },
            resolve_path(&store, &path, false).await.unwrap()
        );

        let path: IpfsPath = format!("/ipfs/{}/m", root).parse().unwrap();
        assert_eq!(
            ResolvedPath {
                cid: root,
                remainder_path: "m".to_string()
            },
            resolve_path(&store, &path, true).await.unwrap()
        );
    }
}
