use std::sync::Arc;

use async_trait::async_trait;
use cid::Cid;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{instrument, warn};

use super::{PinKind, PinStore};
use crate::Error;

const PINS_TABLE: TableDefinition<&[u8], u8> = TableDefinition::new("pins");

/// Pins stored in a redb database, usually the one also holding the blocks
/// (see [crate::blockstore::RedbBlockStore::database]).
#[derive(Clone)]
pub struct RedbPinStore {
    db: Arc<Database>,
}

impl RedbPinStore {
    pub async fn from_database(db: Arc<Database>) -> Result<Self, Error> {
        tokio::task::spawn_blocking({
            let db = db.clone();
            move || -> Result<(), Error> {
                let txn = db.begin_write()?;
                txn.open_table(PINS_TABLE)?;
                txn.commit()?;
                Ok(())
            }
        })
        .await??;

        Ok(Self { db })
    }
}

#[async_trait]
impl PinStore for RedbPinStore {
    #[instrument(skip(self, cid), fields(pin.cid = %cid))]
    async fn get(&self, cid: &Cid) -> Result<Option<PinKind>, Error> {
        let db = self.db.clone();
        let key = cid.to_bytes();
        let kind = tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let txn = db.begin_read()?;
            let table = txn.open_table(PINS_TABLE)?;
            let kind = table.get(key.as_slice())?.map(|v| v.value());
            Ok(kind)
        })
        .await??;

        kind.map(PinKind::from_byte).transpose()
    }

    #[instrument(skip_all, fields(pins.len = pins.len()))]
    async fn put(&self, pins: &[(Cid, PinKind)]) -> Result<(), Error> {
        let db = self.db.clone();
        let pins: Vec<(Vec<u8>, u8)> = pins
            .iter()
            .map(|(cid, kind)| (cid.to_bytes(), kind.to_byte()))
            .collect();
        tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(PINS_TABLE)?;
                for (key, kind) in &pins {
                    table.insert(key.as_slice(), *kind)?;
                }
            }
            txn.commit()?;
            Ok(())
        })
        .await?
    }

    #[instrument(skip_all, fields(cids.len = cids.len()))]
    async fn remove(&self, cids: &[Cid]) -> Result<usize, Error> {
        let db = self.db.clone();
        let keys: Vec<Vec<u8>> = cids.iter().map(Cid::to_bytes).collect();
        tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let txn = db.begin_write()?;
            let mut removed = 0;
            {
                let mut table = txn.open_table(PINS_TABLE)?;
                for key in &keys {
                    if table.remove(key.as_slice())?.is_some() {
                        removed += 1;
                    }
                }
            }
            txn.commit()?;
            Ok(removed)
        })
        .await?
    }

    async fn list(&self) -> Result<Vec<(Cid, PinKind)>, Error> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let txn = db.begin_read()?;
            let table = txn.open_table(PINS_TABLE)?;
            let mut pins = Vec::new();
            for entry in table.iter()? {
                let (k, v) = entry?;
                let cid = Cid::try_from(k.value()).map_err(|e| {
                    warn!(err=%e, "invalid key in pins table");
                    Error::StorageError(format!("invalid key in pins table: {}", e))
                })?;
                pins.push((cid, PinKind::from_byte(v.value())?));
            }
            Ok(pins)
        })
        .await?
    }
}
