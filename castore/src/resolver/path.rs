use std::{fmt, str::FromStr};

use cid::Cid;

use crate::Error;

/// A root CID plus the `/`-separated segments below it.
///
/// Parses `/ipfs/<cid>/a/b`, `/<cid>/a/b` and `<cid>/a/b`. Empty segments
/// (double or trailing slashes) are dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpfsPath {
    pub root: Cid,
    pub segments: Vec<String>,
}

impl IpfsPath {
    pub fn new(root: Cid) -> Self {
        Self {
            root,
            segments: vec![],
        }
    }

    /// The segments joined with `/`, without a leading slash.
    pub fn remainder(&self) -> String {
        self.segments.join("/")
    }
}

/// Splits a relative path into its non-empty segments.
pub fn split_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl FromStr for IpfsPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s
            .strip_prefix("/ipfs/")
            .or_else(|| s.strip_prefix('/'))
            .unwrap_or(s);

        let mut segments = split_segments(trimmed).into_iter();
        let root = segments
            .next()
            .ok_or_else(|| Error::InvalidRequest(format!("no cid in path {:?}", s)))?;
        let root = Cid::try_from(root.as_str())
            .map_err(|e| Error::InvalidRequest(format!("invalid cid in path {:?}: {}", s, e)))?;

        Ok(Self {
            root,
            segments: segments.collect(),
        })
    }
}

impl From<Cid> for IpfsPath {
    fn from(root: Cid) -> Self {
        Self::new(root)
    }
}

impl fmt::Display for IpfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/ipfs/{}", self.root)?;
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}
