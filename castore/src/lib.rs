#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate rstest_reuse;

mod digests;
mod errors;

pub mod blockstore;
pub mod cancel;
pub mod codec;
pub mod fixtures;
pub mod gc;
pub mod import;
pub mod pins;
pub mod pinstore;
pub mod refs;
pub mod repo;
pub mod resolver;
pub mod traverse;
pub mod unixfs;

pub use cid::Cid;
pub use digests::{cid_version, compute_cid, verify, HashAlg};
pub use errors::Error;
pub use repo::Repo;

#[cfg(test)]
mod tests;
