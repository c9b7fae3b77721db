//! Pin rules on top of a [PinStore].

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_stream::stream;
use cid::Cid;
use futures::{stream::BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::blockstore::BlockStore;
use crate::cancel::Cancellation;
use crate::gc::{Protector, WriteSession};
use crate::pinstore::{PinKind, PinStore};
use crate::traverse::traverse;
use crate::Error;

/// Which pins to list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinType {
    #[default]
    All,
    Direct,
    Recursive,
    /// Blocks kept alive by a recursive pin without being pinned
    /// themselves.
    Indirect,
}

impl PinType {
    fn matches(self, kind: PinKind) -> bool {
        matches!(
            (self, kind),
            (PinType::All, _)
                | (PinType::Direct, PinKind::Direct)
                | (PinType::Recursive, PinKind::Recursive)
        )
    }
}

impl From<PinKind> for PinType {
    fn from(kind: PinKind) -> Self {
        match kind {
            PinKind::Direct => PinType::Direct,
            PinKind::Recursive => PinType::Recursive,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PinEntry {
    pub cid: Cid,
    #[serde(rename = "type")]
    pub kind: PinType,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PinAddOptions {
    pub recursive: bool,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

impl Default for PinAddOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            timeout: None,
            cancel: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PinRmOptions {
    pub recursive: bool,
}

impl Default for PinRmOptions {
    fn default() -> Self {
        Self { recursive: true }
    }
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PinLsOptions {
    /// Only report these paths, failing for the ones that aren't pinned.
    pub paths: Vec<String>,
    #[serde(rename = "type")]
    pub kind: PinType,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

/// Maintains the pin set.
///
/// All mutations and snapshots are serialized through one async mutex, so
/// every snapshot is consistent. Verifying that a DAG is complete happens
/// before that mutex is taken, with the verified blocks protected from a
/// concurrent sweep until the pin is recorded.
pub struct PinManager {
    store: Arc<dyn BlockStore>,
    pins: Arc<dyn PinStore>,
    protector: Arc<Protector>,
    lock: Mutex<()>,
}

impl PinManager {
    pub fn new(
        store: Arc<dyn BlockStore>,
        pins: Arc<dyn PinStore>,
        protector: Arc<Protector>,
    ) -> Self {
        Self {
            store,
            pins,
            protector,
            lock: Mutex::new(()),
        }
    }

    /// Checks everything the pin would keep alive is present.
    async fn verify(
        &self,
        session: &Arc<WriteSession>,
        cid: &Cid,
        recursive: bool,
        cancel: &Cancellation,
    ) -> Result<(), Error> {
        if !recursive {
            session.protect(cid).await;
            return match cancel.run(self.store.has(cid)).await? {
                true => Ok(()),
                false => Err(Error::NotFound(*cid)),
            };
        }

        let mut blocks = traverse(
            self.store.clone(),
            vec![*cid],
            Some(session.clone()),
            cancel.clone(),
        );
        while let Some(res) = blocks.next().await {
            match res {
                Ok(_) => {}
                Err(Error::NotFound(missing)) => {
                    return Err(Error::IncompleteDag {
                        root: *cid,
                        missing,
                    })
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Pins `cids`. Either all of them are pinned, or none is.
    #[instrument(skip(self, cids, cancel), fields(cids.len = cids.len()), err)]
    pub async fn add(
        &self,
        cids: Vec<Cid>,
        recursive: bool,
        cancel: Cancellation,
    ) -> Result<Vec<Cid>, Error> {
        let session = Arc::new(self.protector.session());
        for cid in &cids {
            self.verify(&session, cid, recursive, &cancel).await?;
        }

        let _guard = self.lock.lock().await;
        let mut pending = Vec::with_capacity(cids.len());
        for cid in &cids {
            match (self.pins.get(cid).await?, recursive) {
                (Some(PinKind::Recursive), false) => return Err(Error::PinnedRecursively(*cid)),
                (Some(PinKind::Recursive), true) => {}
                (_, true) => pending.push((*cid, PinKind::Recursive)),
                (_, false) => pending.push((*cid, PinKind::Direct)),
            }
        }
        self.pins.put(&pending).await?;
        for (cid, kind) in &pending {
            debug!(%cid, ?kind, "pinned");
        }

        Ok(cids)
    }

    /// Records a recursive pin for a DAG the caller just wrote and holds
    /// protected.
    pub(crate) async fn pin_imported(&self, cid: &Cid) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        if self.pins.get(cid).await? != Some(PinKind::Recursive) {
            self.pins.put(&[(*cid, PinKind::Recursive)]).await?;
            debug!(%cid, "pinned import");
        }
        Ok(())
    }

    /// Unpins `cids`. Either all of them are unpinned, or none is.
    #[instrument(skip(self, cids), fields(cids.len = cids.len()), err)]
    pub async fn rm(&self, cids: Vec<Cid>, recursive: bool) -> Result<Vec<Cid>, Error> {
        let _guard = self.lock.lock().await;
        for cid in &cids {
            match self.pins.get(cid).await? {
                None => return Err(Error::NotPinned(*cid)),
                Some(PinKind::Recursive) if !recursive => {
                    return Err(Error::PinnedRecursively(*cid))
                }
                Some(_) => {}
            }
        }
        let removed = self.pins.remove(&cids).await?;
        debug!(removed, "unpinned");
        Ok(cids)
    }

    /// A consistent copy of all stored pins.
    pub async fn snapshot(&self) -> Result<Vec<(Cid, PinKind)>, Error> {
        let _guard = self.lock.lock().await;
        self.pins.list().await
    }

    /// Lists pins of the given kind. With `cids`, only those are reported,
    /// and each one not pinned as requested yields [Error::NotPinned].
    pub fn ls(
        self: &Arc<Self>,
        cids: Vec<Cid>,
        kind: PinType,
        cancel: Cancellation,
    ) -> BoxStream<'static, Result<PinEntry, Error>> {
        let this = self.clone();

        Box::pin(stream! {
            let mut snapshot = match this.snapshot().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            snapshot.sort();

            let stored: HashMap<Cid, PinKind> = snapshot.iter().copied().collect();
            let roots: Vec<Cid> = snapshot
                .iter()
                .filter(|(_, k)| *k == PinKind::Recursive)
                .map(|(cid, _)| *cid)
                .collect();
            let want_indirect = matches!(kind, PinType::All | PinType::Indirect);

            if cids.is_empty() {
                for (cid, stored_kind) in snapshot {
                    if kind.matches(stored_kind) {
                        yield Ok(PinEntry { cid, kind: stored_kind.into() });
                    }
                }

                if want_indirect {
                    let mut reachable = traverse(this.store.clone(), roots, None, cancel);
                    while let Some(res) = reachable.next().await {
                        match res {
                            Ok(cid) if !stored.contains_key(&cid) => {
                                yield Ok(PinEntry { cid, kind: PinType::Indirect });
                            }
                            Ok(_) => {}
                            Err(e) => yield Err(e),
                        }
                    }
                }
                return;
            }

            let mut indirect: Option<HashSet<Cid>> = None;
            for cid in cids {
                if let Some(stored_kind) = stored.get(&cid) {
                    if kind.matches(*stored_kind) {
                        yield Ok(PinEntry { cid, kind: (*stored_kind).into() });
                        continue;
                    }
                }

                if want_indirect && !stored.contains_key(&cid) {
                    if indirect.is_none() {
                        let mut set = HashSet::new();
                        let mut reachable = traverse(this.store.clone(), roots.clone(), None, cancel.clone());
                        while let Some(res) = reachable.next().await {
                            match res {
                                Ok(cid) => {
                                    set.insert(cid);
                                }
                                Err(e @ (Error::Cancelled | Error::TimedOut)) => {
                                    yield Err(e);
                                    return;
                                }
                                Err(e) => yield Err(e),
                            }
                        }
                        indirect = Some(set);
                    }
                    if indirect.as_ref().is_some_and(|set| set.contains(&cid)) {
                        yield Ok(PinEntry { cid, kind: PinType::Indirect });
                        continue;
                    }
                }

                yield Err(Error::NotPinned(cid));
            }
        })
    }
}
