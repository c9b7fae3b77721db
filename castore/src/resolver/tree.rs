use std::{collections::VecDeque, sync::Arc};

use async_stream::stream;
use cid::Cid;
use futures::stream::BoxStream;
use tracing::warn;

use super::{load, resolve, ResolvedValue};
use crate::blockstore::BlockStore;
use crate::cancel::Cancellation;
use crate::codec::{dag_cbor, Link};
use crate::Error;

/// Enumerates the paths reachable below `path` of `cid`.
///
/// Emits the link names of the resolved node, and with `recursive` descends
/// into every child right after emitting it (pre-order, depth first). CIDs
/// are not de-duplicated. A child that can't be loaded is reported in-band
/// and skipped. A cancellation ends the stream after yielding the error.
pub fn tree(
    store: Arc<dyn BlockStore>,
    cid: Cid,
    path: String,
    recursive: bool,
    cancel: Cancellation,
) -> BoxStream<'static, Result<String, Error>> {
    Box::pin(stream! {
        let root_links = match cancel.run(resolve(store.as_ref(), &cid, &path, false)).await {
            Ok(resolved) => match resolved.value {
                ResolvedValue::Node(node) => node.links(),
                ResolvedValue::Ipld(value) => dag_cbor::links(&value)
                    .into_iter()
                    .map(|(name, cid)| Link { name, cid, size: None })
                    .collect(),
            },
            Err(e) => {
                yield Err(e);
                return;
            }
        };

        // Every frame holds the links still to visit below a path prefix.
        let mut stack: Vec<(String, VecDeque<Link>)> = vec![(String::new(), root_links.into())];

        while let Some((prefix, links)) = stack.last_mut() {
            let Some(link) = links.pop_front() else {
                stack.pop();
                continue;
            };

            if let Err(e) = cancel.check() {
                yield Err(e);
                return;
            }

            let link_path = if prefix.is_empty() {
                link.name.clone()
            } else {
                format!("{}/{}", prefix, link.name)
            };
            yield Ok(link_path.clone());

            if recursive {
                match cancel.run(load(store.as_ref(), &link.cid)).await {
                    Ok(node) => stack.push((link_path, node.links().into())),
                    Err(e @ (Error::Cancelled | Error::TimedOut)) => {
                        yield Err(e);
                        return;
                    }
                    Err(e) => {
                        warn!(cid = %link.cid, err = %e, "unable to load child");
                        yield Err(e);
                    }
                }
            }
        }
    })
}
