use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use cid::Cid;
use parking_lot::RwLock;

use super::{PinKind, PinStore};
use crate::Error;

#[derive(Clone, Default)]
pub struct MemoryPinStore {
    db: Arc<RwLock<HashMap<Cid, PinKind>>>,
}

#[async_trait]
impl PinStore for MemoryPinStore {
    async fn get(&self, cid: &Cid) -> Result<Option<PinKind>, Error> {
        Ok(self.db.read().get(cid).copied())
    }

    async fn put(&self, pins: &[(Cid, PinKind)]) -> Result<(), Error> {
        self.db.write().extend(pins.iter().copied());
        Ok(())
    }

    async fn remove(&self, cids: &[Cid]) -> Result<usize, Error> {
        let mut db = self.db.write();
        Ok(cids.iter().filter(|cid| db.remove(*cid).is_some()).count())
    }

    async fn list(&self) -> Result<Vec<(Cid, PinKind)>, Error> {
        Ok(self.db.read().iter().map(|(c, k)| (*c, *k)).collect())
    }
}
