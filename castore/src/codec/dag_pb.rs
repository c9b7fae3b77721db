//! The dag-pb node format.
//!
//! Decoding goes through prost. Encoding is done by hand, as the canonical
//! form writes all links (field 2) before the data (field 1), which is not
//! the order prost emits fields in.

use bytes::Bytes;
use cid::Cid;
use prost::Message;

use super::UnixFs;
use crate::Error;

mod proto {
    use bytes::Bytes;

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct PbLink {
        #[prost(bytes = "bytes", optional, tag = "1")]
        pub hash: Option<Bytes>,
        #[prost(string, optional, tag = "2")]
        pub name: Option<String>,
        #[prost(uint64, optional, tag = "3")]
        pub tsize: Option<u64>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct PbNode {
        #[prost(bytes = "bytes", optional, tag = "1")]
        pub data: Option<Bytes>,
        #[prost(message, repeated, tag = "2")]
        pub links: Vec<PbLink>,
    }
}

/// A link inside a [PbNode].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PbLink {
    pub cid: Cid,
    pub name: Option<String>,
    pub tsize: Option<u64>,
}

impl PbLink {
    pub fn new(cid: Cid, name: impl Into<String>, tsize: u64) -> Self {
        Self {
            cid,
            name: Some(name.into()),
            tsize: Some(tsize),
        }
    }
}

/// A decoded dag-pb node. Links keep the order they were given in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PbNode {
    pub data: Option<Bytes>,
    pub links: Vec<PbLink>,
}

impl PbNode {
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let node = proto::PbNode::decode(buf)
            .map_err(|e| Error::MalformedNode(format!("invalid dag-pb node: {}", e)))?;

        let links = node
            .links
            .into_iter()
            .enumerate()
            .map(|(i, link)| {
                let hash = link.hash.ok_or_else(|| {
                    Error::MalformedNode(format!("dag-pb link {} has no hash", i))
                })?;
                let cid = Cid::try_from(hash.as_ref()).map_err(|e| {
                    Error::MalformedNode(format!("dag-pb link {} has an invalid cid: {}", i, e))
                })?;
                Ok(PbLink {
                    cid,
                    name: link.name,
                    tsize: link.tsize,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Self {
            data: node.data,
            links,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len_hint());
        for link in &self.links {
            let link = proto::PbLink {
                hash: Some(Bytes::from(link.cid.to_bytes())),
                name: link.name.clone(),
                tsize: link.tsize,
            };
            prost::encoding::message::encode(2, &link, &mut buf);
        }
        if let Some(data) = &self.data {
            prost::encoding::bytes::encode(1, data, &mut buf);
        }
        buf
    }

    fn encoded_len_hint(&self) -> usize {
        self.data.as_ref().map(|d| d.len() + 8).unwrap_or(0) + self.links.len() * 64
    }

    /// Interprets `data` as a UnixFS message, [None] if there is no data.
    pub fn unixfs(&self) -> Option<Result<UnixFs, Error>> {
        self.data.as_ref().map(|data| UnixFs::decode(data))
    }

    /// Sum of the cumulative sizes of all links.
    pub fn links_tsize(&self) -> u64 {
        self.links.iter().filter_map(|l| l.tsize).sum()
    }
}
