//! Mark and sweep collection of unpinned blocks.

use std::{collections::HashSet, sync::Arc, time::Duration};

use async_stream::stream;
use cid::Cid;
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Span};

use crate::blockstore::BlockStore;
use crate::cancel::Cancellation;
use crate::pins::PinManager;
use crate::pinstore::PinKind;
use crate::traverse::traverse;
use crate::Error;

mod protect;

pub use protect::{Protector, WriteSession};

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GcOptions {
    /// Only report failures.
    pub quiet: bool,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

/// One record of a collection run: a deleted block, or a failure.
#[derive(Clone, Debug, PartialEq)]
pub struct GcResult {
    pub cid: Option<Cid>,
    pub err: Option<Error>,
}

impl GcResult {
    fn deleted(cid: Cid) -> Self {
        Self {
            cid: Some(cid),
            err: None,
        }
    }

    fn failed(cid: Option<Cid>, err: Error) -> Self {
        Self {
            cid,
            err: Some(err),
        }
    }
}

/// Ends the sweep on the protector when the collection stream finishes or
/// is dropped.
struct SweepGuard(Arc<Protector>);

impl SweepGuard {
    fn new(protector: Arc<Protector>) -> Self {
        protector.begin_sweep();
        Self(protector)
    }
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.0.end_sweep();
    }
}

pub struct GarbageCollector {
    store: Arc<dyn BlockStore>,
    pins: Arc<PinManager>,
    protector: Arc<Protector>,
    running: Arc<Mutex<()>>,
}

impl GarbageCollector {
    pub fn new(store: Arc<dyn BlockStore>, pins: Arc<PinManager>, protector: Arc<Protector>) -> Self {
        Self {
            store,
            pins,
            protector,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Deletes every block not reachable from a pin and not written by an
    /// import still in flight.
    ///
    /// Runs lazily as the returned stream is polled. A second collection
    /// waits for the running one to finish, or for its own cancellation.
    /// Blocks found missing while marking are reported and treated as
    /// collected already.
    #[instrument(skip_all, fields(quiet = options.quiet))]
    pub fn collect(&self, options: GcOptions) -> BoxStream<'static, GcResult> {
        let store = self.store.clone();
        let pins = self.pins.clone();
        let protector = self.protector.clone();
        let running = self.running.clone();
        let span = Span::current();

        let mut inner = Box::pin(stream! {
            let cancel = Cancellation::new(options.cancel, options.timeout);
            let _running = match cancel.run(async { Ok(running.lock_owned().await) }).await {
                Ok(guard) => guard,
                Err(e) => {
                    yield GcResult::failed(None, e);
                    return;
                }
            };
            let _sweep = SweepGuard::new(protector.clone());

            let snapshot = match cancel.run(pins.snapshot()).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    yield GcResult::failed(None, e);
                    return;
                }
            };

            // mark
            let mut live: HashSet<Cid> = HashSet::new();
            let mut roots = vec![];
            for (cid, kind) in snapshot {
                match kind {
                    PinKind::Direct => {
                        live.insert(cid);
                    }
                    PinKind::Recursive => roots.push(cid),
                }
            }

            let mut reachable = traverse(store.clone(), roots, None, cancel.clone());
            while let Some(res) = reachable.next().await {
                match res {
                    Ok(cid) => {
                        live.insert(cid);
                    }
                    Err(e @ (Error::Cancelled | Error::TimedOut)) => {
                        yield GcResult::failed(None, e);
                        return;
                    }
                    Err(e) => {
                        let cid = match &e {
                            Error::NotFound(cid) => Some(*cid),
                            _ => None,
                        };
                        yield GcResult::failed(cid, e);
                    }
                }
            }
            debug!(live = live.len(), "marked");

            // sweep
            let mut deleted = 0u64;
            let mut blocks = store.list();
            while let Some(res) = blocks.next().await {
                if let Err(e) = cancel.check() {
                    yield GcResult::failed(None, e);
                    return;
                }

                let cid = match res {
                    Ok(cid) => cid,
                    Err(e) => {
                        yield GcResult::failed(None, e);
                        continue;
                    }
                };
                if live.contains(&cid) {
                    continue;
                }

                match protector.delete_unprotected(store.as_ref(), &cid).await {
                    Ok(true) => {
                        deleted += 1;
                        if !options.quiet {
                            yield GcResult::deleted(cid);
                        }
                    }
                    Ok(false) => debug!(%cid, "skipped protected block"),
                    Err(e) => {
                        warn!(%cid, err = %e, "unable to delete block");
                        yield GcResult::failed(Some(cid), e);
                    }
                }
            }
            info!(deleted, "collection done");
        });

        Box::pin(stream::poll_fn(move |cx| {
            let _entered = span.enter();
            inner.poll_next_unpin(cx)
        }))
    }
}
