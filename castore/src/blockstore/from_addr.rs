use std::path::PathBuf;

use url::Url;

use super::{BlockStore, MemoryBlockStore, RedbBlockStore};
use crate::Error;

/// Constructs a new instance of a [BlockStore] from an URI.
///
/// The following schemes are supported by the following services:
/// - `memory://` ([MemoryBlockStore])
/// - `redb://` ([RedbBlockStore]), in memory without a path, on disk with
///   one (`redb:///var/lib/blocks.redb`)
pub async fn from_addr(uri: &str) -> Result<Box<dyn BlockStore>, Error> {
    let url = parse_url(uri)?;

    let store: Box<dyn BlockStore> = match url.scheme() {
        "memory" => {
            check_memory_url(&url)?;
            Box::<MemoryBlockStore>::default()
        }
        "redb" => Box::new(redb_from_url(&url).await?),
        scheme => return Err(Error::StorageError(format!("unknown scheme: {}", scheme))),
    };

    Ok(store)
}

pub(crate) fn parse_url(uri: &str) -> Result<Url, Error> {
    Url::parse(uri).map_err(|e| Error::StorageError(format!("unable to parse url: {}", e)))
}

pub(crate) fn check_memory_url(url: &Url) -> Result<(), Error> {
    // memory doesn't support host or path in the URL.
    if url.has_host() || !url.path().is_empty() {
        return Err(Error::StorageError("invalid url".to_string()));
    }
    Ok(())
}

pub(crate) async fn redb_from_url(url: &Url) -> Result<RedbBlockStore, Error> {
    // redb doesn't support host, and a path can be provided (otherwise
    // it'll live in memory only).
    if url.has_host() {
        return Err(Error::StorageError("no host allowed".to_string()));
    }

    if url.path().is_empty() {
        RedbBlockStore::new_temporary()
    } else {
        RedbBlockStore::new(PathBuf::from(url.path())).await
    }
}
