use std::{fmt, str::FromStr};

use cid::{Cid, Version};
use multihash::Multihash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{codec::Codec, Error};

/// Multihash code for sha2-256.
pub const SHA2_256: u64 = 0x12;
/// Multihash code for blake3, 32 byte output.
pub const BLAKE3: u64 = 0x1e;

/// Hash functions blocks can be addressed with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlg {
    #[default]
    #[serde(rename = "sha2-256")]
    Sha2_256,
    #[serde(rename = "blake3")]
    Blake3,
}

impl HashAlg {
    pub fn code(&self) -> u64 {
        match self {
            HashAlg::Sha2_256 => SHA2_256,
            HashAlg::Blake3 => BLAKE3,
        }
    }

    pub fn digest(&self, data: &[u8]) -> [u8; 32] {
        match self {
            HashAlg::Sha2_256 => Sha256::digest(data).into(),
            HashAlg::Blake3 => *blake3::hash(data).as_bytes(),
        }
    }

    /// Wraps the digest of `data` into a multihash.
    pub fn multihash(&self, data: &[u8]) -> Result<Multihash<64>, Error> {
        Multihash::wrap(self.code(), &self.digest(data))
            .map_err(|e| Error::InvalidRequest(format!("unable to build multihash: {}", e)))
    }
}

impl TryFrom<u64> for HashAlg {
    type Error = Error;

    fn try_from(code: u64) -> Result<Self, Self::Error> {
        match code {
            SHA2_256 => Ok(HashAlg::Sha2_256),
            BLAKE3 => Ok(HashAlg::Blake3),
            code => Err(Error::InvalidRequest(format!(
                "unsupported hash function {:#x}",
                code
            ))),
        }
    }
}

impl FromStr for HashAlg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha2-256" => Ok(HashAlg::Sha2_256),
            "blake3" => Ok(HashAlg::Blake3),
            other => Err(Error::InvalidRequest(format!(
                "unsupported hash function {}",
                other
            ))),
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlg::Sha2_256 => write!(f, "sha2-256"),
            HashAlg::Blake3 => write!(f, "blake3"),
        }
    }
}

/// Parses a numeric CID version as it appears in option structs.
pub fn cid_version(version: u64) -> Result<Version, Error> {
    Version::try_from(version)
        .map_err(|_| Error::InvalidRequest(format!("unsupported cid version {}", version)))
}

/// Computes the CID of `data` encoded as `codec`.
///
/// CIDv0 can only describe dag-pb blocks hashed with sha2-256, every other
/// combination is rejected.
pub fn compute_cid(
    data: &[u8],
    codec: Codec,
    hash_alg: HashAlg,
    version: Version,
) -> Result<Cid, Error> {
    if version == Version::V0 && (codec != Codec::DagPb || hash_alg != HashAlg::Sha2_256) {
        return Err(Error::InvalidRequest(format!(
            "cidv0 requires dag-pb and sha2-256, got {} and {}",
            codec, hash_alg
        )));
    }

    Ok(Cid::new(version, codec.code(), hash_alg.multihash(data)?)?)
}

/// Checks `data` hashes to the digest contained in `cid`.
pub fn verify(cid: &Cid, data: &[u8]) -> Result<bool, Error> {
    let hash_alg = HashAlg::try_from(cid.hash().code())?;
    Ok(hash_alg.digest(data).as_slice() == cid.hash().digest())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The empty dag-pb node is well known.
    #[test]
    fn empty_dag_pb_v0() {
        let cid = compute_cid(&[], Codec::DagPb, HashAlg::Sha2_256, Version::V0).unwrap();
        assert_eq!(
            "QmdfTbBqBPQ7VNxZEYEj14VmRuZBkqFbiwReogJgS1zR1n",
            cid.to_string()
        );
    }

    #[test]
    fn raw_v1_roundtrips_through_string() {
        let cid = compute_cid(b"abc", Codec::Raw, HashAlg::Sha2_256, Version::V1).unwrap();
        assert_eq!(Codec::Raw.code(), cid.codec());
        assert_eq!(cid, Cid::try_from(cid.to_string().as_str()).unwrap());
        assert!(verify(&cid, b"abc").unwrap());
        assert!(!verify(&cid, b"abd").unwrap());
    }

    #[test]
    fn v0_rejects_raw() {
        assert!(matches!(
            compute_cid(b"abc", Codec::Raw, HashAlg::Sha2_256, Version::V0),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            compute_cid(b"abc", Codec::DagPb, HashAlg::Blake3, Version::V0),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn blake3_multihash() {
        let cid = compute_cid(b"abc", Codec::Raw, HashAlg::Blake3, Version::V1).unwrap();
        assert_eq!(BLAKE3, cid.hash().code());
        assert_eq!(blake3::hash(b"abc").as_bytes(), cid.hash().digest());
    }

    #[test]
    fn parse_hash_alg() {
        assert_eq!(HashAlg::Blake3, "blake3".parse().unwrap());
        assert!("md5".parse::<HashAlg>().is_err());
    }
}
