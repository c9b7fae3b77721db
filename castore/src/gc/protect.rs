use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use bytes::Bytes;
use cid::Cid;
use parking_lot::Mutex;
use tokio::sync::RwLock;

use crate::blockstore::BlockStore;
use crate::Error;

/// Tracks the blocks written by in-flight imports, so a concurrent sweep
/// leaves them alone until they are pinned.
///
/// A block is registered before it is written. Registration plus write
/// (on the writer side) and the protection check plus delete (on the
/// collector side) are serialized through `gate`, so a sweep can never
/// delete a block a writer just relied on being present.
///
/// When a session ends during a sweep, its blocks stay protected until that
/// sweep finishes, as the sweep works off a pin snapshot taken before the
/// session's pin was recorded.
#[derive(Default)]
pub struct Protector {
    gate: RwLock<()>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_session: u64,
    sessions: HashMap<u64, HashSet<Cid>>,
    retired: HashSet<Cid>,
    sweeping: bool,
}

impl Protector {
    /// Opens a new write session.
    pub fn session(self: &Arc<Self>) -> WriteSession {
        let mut inner = self.inner.lock();
        let id = inner.next_session;
        inner.next_session += 1;
        inner.sessions.insert(id, HashSet::new());

        WriteSession {
            id,
            protector: self.clone(),
        }
    }

    fn is_protected(inner: &Inner, cid: &Cid) -> bool {
        inner.retired.contains(cid) || inner.sessions.values().any(|s| s.contains(cid))
    }

    pub(crate) fn begin_sweep(&self) {
        self.inner.lock().sweeping = true;
    }

    pub(crate) fn end_sweep(&self) {
        let mut inner = self.inner.lock();
        inner.sweeping = false;
        inner.retired.clear();
    }

    /// Deletes `cid` unless it is protected. Returns whether it was deleted.
    pub(crate) async fn delete_unprotected(
        &self,
        store: &dyn BlockStore,
        cid: &Cid,
    ) -> Result<bool, Error> {
        let _gate = self.gate.write().await;
        let protected = Self::is_protected(&self.inner.lock(), cid);
        if protected {
            return Ok(false);
        }
        store.delete(cid).await?;
        Ok(true)
    }

    #[cfg(test)]
    pub(crate) fn protected(&self, cid: &Cid) -> bool {
        Self::is_protected(&self.inner.lock(), cid)
    }
}

/// A set of blocks written on behalf of one import or put.
pub struct WriteSession {
    id: u64,
    protector: Arc<Protector>,
}

impl WriteSession {
    fn register(&self, cid: &Cid) {
        let mut inner = self.protector.inner.lock();
        if let Some(set) = inner.sessions.get_mut(&self.id) {
            set.insert(*cid);
        }
    }

    /// Registers `cid` and writes the block.
    pub async fn put_block(
        &self,
        store: &dyn BlockStore,
        cid: &Cid,
        data: Bytes,
    ) -> Result<bool, Error> {
        let _gate = self.protector.gate.read().await;
        self.register(cid);
        store.put_block(cid, data).await
    }

    /// Registers `cid` without writing anything. Blocks already present stay
    /// present for as long as the session lives.
    pub async fn protect(&self, cid: &Cid) {
        let _gate = self.protector.gate.read().await;
        self.register(cid);
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        let mut inner = self.protector.inner.lock();
        if let Some(cids) = inner.sessions.remove(&self.id) {
            if inner.sweeping {
                inner.retired.extend(cids);
            }
        }
    }
}
