//! Enumerates the links below blocks.

use std::{collections::HashSet, sync::Arc, time::Duration};

use async_stream::stream;
use cid::Cid;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use tokio_util::sync::CancellationToken;

use crate::blockstore::BlockStore;
use crate::cancel::Cancellation;
use crate::codec::Link;
use crate::resolver::load;
use crate::Error;

pub const DEFAULT_FORMAT: &str = "<dst>";
const EDGES_FORMAT: &str = "<src> -> <dst>";

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefsOptions {
    pub recursive: bool,
    /// Report every CID only once.
    pub unique: bool,
    /// Depth limit when `recursive` is set.
    pub max_depth: Option<usize>,
    /// Render `<src> -> <dst>`, conflicts with `format`.
    pub edges: bool,
    pub format: Option<String>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

impl RefsOptions {
    fn template(&self) -> Result<String, Error> {
        match (&self.format, self.edges) {
            (Some(_), true) => Err(Error::InvalidRequest(
                "edges and format can't be combined".to_string(),
            )),
            (Some(format), false) => Ok(format.clone()),
            (None, true) => Ok(EDGES_FORMAT.to_string()),
            (None, false) => Ok(DEFAULT_FORMAT.to_string()),
        }
    }

    fn max_depth(&self) -> Option<usize> {
        if self.recursive {
            self.max_depth
        } else {
            Some(1)
        }
    }
}

fn render(template: &str, src: &Cid, link: &Link) -> String {
    template
        .replace("<src>", &src.to_string())
        .replace("<dst>", &link.cid.to_string())
        .replace("<linkname>", &link.name)
}

/// Streams the links below each of `roots`, depth first, rendered with the
/// options' format.
pub fn refs(
    store: Arc<dyn BlockStore>,
    roots: Vec<Cid>,
    options: RefsOptions,
    cancel: Cancellation,
) -> BoxStream<'static, Result<String, Error>> {
    Box::pin(stream! {
        let template = match options.template() {
            Ok(template) => template,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        let max_depth = options.max_depth();
        let mut seen: HashSet<Cid> = HashSet::new();

        for root in roots {
            // (parent, links left to visit, depth of those links)
            let mut stack: Vec<(Cid, std::vec::IntoIter<Link>, usize)> = vec![];

            match cancel.run(load(store.as_ref(), &root)).await {
                Ok(node) => stack.push((root, node.links().into_iter(), 1)),
                Err(e) => {
                    let fatal = matches!(e, Error::Cancelled | Error::TimedOut);
                    yield Err(e);
                    if fatal {
                        return;
                    }
                    continue;
                }
            }

            while let Some((src, links, depth)) = stack.last_mut() {
                let Some(link) = links.next() else {
                    stack.pop();
                    continue;
                };
                let (src, depth) = (*src, *depth);

                if options.unique && !seen.insert(link.cid) {
                    continue;
                }
                yield Ok(render(&template, &src, &link));

                if max_depth.is_some_and(|max| depth >= max) {
                    continue;
                }
                match cancel.run(load(store.as_ref(), &link.cid)).await {
                    Ok(node) => stack.push((link.cid, node.links().into_iter(), depth + 1)),
                    Err(e @ (Error::Cancelled | Error::TimedOut)) => {
                        yield Err(e);
                        return;
                    }
                    Err(e) => yield Err(e),
                }
            }
        }
    })
}

/// Streams every CID held by the store.
pub fn refs_local(store: &dyn BlockStore) -> BoxStream<'static, Result<Cid, Error>> {
    store.list()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::StreamExt;
    use ipld_core::ipld::Ipld;

    use super::{refs, refs_local, RefsOptions};
    use crate::blockstore::{BlockStore, MemoryBlockStore};
    use crate::cancel::Cancellation;
    use crate::fixtures::{put_abc_tree, put_cbor};
    use crate::Error;

    async fn collect(
        store: Arc<dyn BlockStore>,
        root: cid::Cid,
        options: RefsOptions,
    ) -> Vec<Result<String, Error>> {
        refs(store, vec![root], options, Cancellation::default())
            .collect()
            .await
    }

    #[tokio::test]
    async fn direct_links() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let (_, nodes) = put_abc_tree(store.as_ref()).await;

        assert_eq!(
            vec![Ok(nodes["a/b"].to_string()), Ok(nodes["a/d"].to_string())],
            collect(store, nodes["a"], RefsOptions::default()).await
        );
    }

    #[tokio::test]
    async fn recursive_edges() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let (_, nodes) = put_abc_tree(store.as_ref()).await;

        let options = RefsOptions {
            recursive: true,
            edges: true,
            ..Default::default()
        };
        assert_eq!(
            vec![
                Ok(format!("{} -> {}", nodes["a"], nodes["a/b"])),
                Ok(format!("{} -> {}", nodes["a/b"], nodes["a/b/c"])),
                Ok(format!("{} -> {}", nodes["a"], nodes["a/d"])),
            ],
            collect(store, nodes["a"], options).await
        );
    }

    #[tokio::test]
    async fn max_depth_and_format() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let (root, _) = put_abc_tree(store.as_ref()).await;

        let options = RefsOptions {
            recursive: true,
            max_depth: Some(2),
            format: Some("<linkname>".to_string()),
            ..Default::default()
        };
        let names: Vec<String> = collect(store, root, options)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(vec!["a", "b", "d"], names);
    }

    #[tokio::test]
    async fn unique() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let (dir, _) = put_abc_tree(store.as_ref()).await;
        let root = put_cbor(
            store.as_ref(),
            vec![("x", Ipld::Link(dir)), ("y", Ipld::Link(dir))],
        )
        .await;

        let options = RefsOptions {
            recursive: true,
            ..Default::default()
        };
        assert_eq!(10, collect(store.clone(), root, options.clone()).await.len());

        let options = RefsOptions {
            unique: true,
            ..options
        };
        assert_eq!(5, collect(store, root, options).await.len());
    }

    #[tokio::test]
    async fn edges_and_format_conflict() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        let (root, _) = put_abc_tree(store.as_ref()).await;
        let options = RefsOptions {
            edges: true,
            format: Some("<dst>".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            collect(store, root, options).await.as_slice(),
            [Err(Error::InvalidRequest(_))]
        ));
    }

    #[tokio::test]
    async fn local_lists_all() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::default());
        put_abc_tree(store.as_ref()).await;
        assert_eq!(5, refs_local(store.as_ref()).collect::<Vec<_>>().await.len());
    }
}
