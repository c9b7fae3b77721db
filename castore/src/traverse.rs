use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};

use async_stream::stream;
use cid::Cid;
use futures::stream::BoxStream;
use tracing::warn;

use crate::blockstore::BlockStore;
use crate::cancel::Cancellation;
use crate::gc::WriteSession;
use crate::resolver::load;
use crate::Error;

/// Traverses the DAGs below `roots`, yielding every reachable CID (roots
/// included) once.
///
/// This is BFS. A block that can't be loaded or decoded is yielded as an
/// error and its subtree is skipped, the traversal carries on with the
/// remaining blocks. When `session` is given, every CID is registered with
/// it before its block is read, so a concurrent sweep leaves it in place.
/// Cancellation ends the stream after yielding the error.
pub fn traverse(
    store: Arc<dyn BlockStore>,
    roots: Vec<Cid>,
    session: Option<Arc<WriteSession>>,
    cancel: Cancellation,
) -> BoxStream<'static, Result<Cid, Error>> {
    let mut worklist: VecDeque<Cid> = VecDeque::new();
    let mut seen: HashSet<Cid> = HashSet::new();
    for root in roots {
        if seen.insert(root) {
            worklist.push_back(root);
        }
    }

    Box::pin(stream! {
        while let Some(cid) = worklist.pop_front() {
            if let Some(session) = &session {
                session.protect(&cid).await;
            }

            match cancel.run(load(store.as_ref(), &cid)).await {
                Ok(node) => {
                    for link in node.links() {
                        if seen.insert(link.cid) {
                            worklist.push_back(link.cid);
                        }
                    }
                    yield Ok(cid);
                }
                Err(e @ (Error::Cancelled | Error::TimedOut)) => {
                    yield Err(e);
                    return;
                }
                Err(e) => {
                    warn!(%cid, err = %e, "unable to load block during traversal");
                    yield Err(e);
                }
            }
        }
    })
}
