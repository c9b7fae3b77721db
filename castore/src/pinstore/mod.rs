use async_trait::async_trait;
use cid::Cid;
use serde::{Deserialize, Serialize};

use crate::Error;

mod memory;
mod redb;

pub use self::memory::MemoryPinStore;
pub use self::redb::RedbPinStore;

/// How a stored pin protects its CID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinKind {
    /// Only the block itself.
    Direct,
    /// The block and everything reachable from it.
    Recursive,
}

impl PinKind {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            PinKind::Direct => 0,
            PinKind::Recursive => 1,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Result<Self, Error> {
        match b {
            0 => Ok(PinKind::Direct),
            1 => Ok(PinKind::Recursive),
            b => Err(Error::StorageError(format!("invalid pin kind {}", b))),
        }
    }
}

/// Persistence for pin records. Higher level rules (recursive pins
/// replacing direct ones, completeness checks) live in
/// [crate::pins::PinManager].
#[async_trait]
pub trait PinStore: Send + Sync {
    async fn get(&self, cid: &Cid) -> Result<Option<PinKind>, Error>;

    /// Records every `(cid, kind)`, replacing previous records. Either all
    /// of them are written, or none is.
    async fn put(&self, pins: &[(Cid, PinKind)]) -> Result<(), Error>;

    /// Removes the records of `cids` at once, returning how many existed.
    async fn remove(&self, cids: &[Cid]) -> Result<usize, Error>;

    /// All records, read at a single point in time.
    async fn list(&self) -> Result<Vec<(Cid, PinKind)>, Error>;
}

#[async_trait]
impl<A> PinStore for A
where
    A: AsRef<dyn PinStore> + Send + Sync,
{
    async fn get(&self, cid: &Cid) -> Result<Option<PinKind>, Error> {
        self.as_ref().get(cid).await
    }

    async fn put(&self, pins: &[(Cid, PinKind)]) -> Result<(), Error> {
        self.as_ref().put(pins).await
    }

    async fn remove(&self, cids: &[Cid]) -> Result<usize, Error> {
        self.as_ref().remove(cids).await
    }

    async fn list(&self) -> Result<Vec<(Cid, PinKind)>, Error> {
        self.as_ref().list().await
    }
}
