//! The codec registry: maps a multicodec tag to the functions decoding,
//! encoding and extracting links from a block.

use std::{collections::BTreeMap, fmt, str::FromStr};

use bytes::Bytes;
use cid::Cid;
use ipld_core::ipld::Ipld;
use serde::{Deserialize, Serialize};

use crate::Error;

pub mod dag_cbor;
mod dag_pb;
pub mod unixfs;

pub use dag_pb::{PbLink, PbNode};
pub use unixfs::{DataType, Mtime, UnixFs};

/// The block formats understood by this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Codec {
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "dag-pb")]
    DagPb,
    #[serde(rename = "dag-cbor")]
    DagCbor,
}

impl Codec {
    pub fn code(&self) -> u64 {
        match self {
            Codec::Raw => 0x55,
            Codec::DagPb => 0x70,
            Codec::DagCbor => 0x71,
        }
    }
}

impl TryFrom<u64> for Codec {
    type Error = Error;

    fn try_from(code: u64) -> Result<Self, Self::Error> {
        match code {
            0x55 => Ok(Codec::Raw),
            0x70 => Ok(Codec::DagPb),
            0x71 => Ok(Codec::DagCbor),
            code => Err(Error::UnsupportedFormat(code)),
        }
    }
}

impl FromStr for Codec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Codec::Raw),
            "dag-pb" => Ok(Codec::DagPb),
            "dag-cbor" => Ok(Codec::DagCbor),
            other => Err(Error::InvalidRequest(format!("unknown format {}", other))),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Codec::Raw => "raw",
            Codec::DagPb => "dag-pb",
            Codec::DagCbor => "dag-cbor",
        })
    }
}

/// A decoded block.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Raw(Bytes),
    DagPb(PbNode),
    DagCbor(Ipld),
}

/// A link out of a [Node].
///
/// Unnamed dag-pb links are named by their index, dag-cbor links by the
/// path to the CID inside the value. Only dag-pb links carry a size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub cid: Cid,
    pub size: Option<u64>,
}

/// Decodes `buf` as the format with multicodec `code`.
pub fn decode(code: u64, buf: &[u8]) -> Result<Node, Error> {
    Ok(match Codec::try_from(code)? {
        Codec::Raw => Node::Raw(Bytes::copy_from_slice(buf)),
        Codec::DagPb => Node::DagPb(PbNode::decode(buf)?),
        Codec::DagCbor => Node::DagCbor(dag_cbor::decode(buf)?),
    })
}

/// Encodes `node` in its own format.
pub fn encode(node: &Node) -> Result<Vec<u8>, Error> {
    match node {
        Node::Raw(data) => Ok(data.to_vec()),
        Node::DagPb(node) => Ok(node.encode()),
        Node::DagCbor(value) => dag_cbor::encode(value),
    }
}

/// Returns the links of `node`, in node order.
pub fn links(node: &Node) -> Vec<Link> {
    node.links()
}

impl Node {
    pub fn codec(&self) -> Codec {
        match self {
            Node::Raw(_) => Codec::Raw,
            Node::DagPb(_) => Codec::DagPb,
            Node::DagCbor(_) => Codec::DagCbor,
        }
    }

    pub fn links(&self) -> Vec<Link> {
        match self {
            Node::Raw(_) => vec![],
            Node::DagPb(node) => node
                .links
                .iter()
                .enumerate()
                .map(|(i, l)| Link {
                    name: match &l.name {
                        Some(name) if !name.is_empty() => name.clone(),
                        _ => i.to_string(),
                    },
                    cid: l.cid,
                    size: l.tsize,
                })
                .collect(),
            Node::DagCbor(value) => dag_cbor::links(value)
                .into_iter()
                .map(|(name, cid)| Link {
                    name,
                    cid,
                    size: None,
                })
                .collect(),
        }
    }

    /// Interprets the `Data` of a dag-pb node as UnixFS.
    ///
    /// Returns [None] for other formats and for dag-pb nodes without data.
    pub fn unixfs(&self) -> Option<Result<UnixFs, Error>> {
        match self {
            Node::DagPb(node) => node.unixfs(),
            _ => None,
        }
    }

    /// The IPLD data model view of the node, used to address fields in paths.
    pub fn to_ipld(&self) -> Ipld {
        match self {
            Node::Raw(data) => Ipld::Bytes(data.to_vec()),
            Node::DagCbor(value) => value.clone(),
            Node::DagPb(node) => {
                let mut map = BTreeMap::new();
                if let Some(data) = &node.data {
                    map.insert("Data".to_string(), Ipld::Bytes(data.to_vec()));
                }
                let links = node
                    .links
                    .iter()
                    .map(|l| {
                        let mut link = BTreeMap::new();
                        link.insert("Hash".to_string(), Ipld::Link(l.cid));
                        if let Some(name) = &l.name {
                            link.insert("Name".to_string(), Ipld::String(name.clone()));
                        }
                        if let Some(tsize) = l.tsize {
                            link.insert("Tsize".to_string(), Ipld::Integer(tsize.into()));
                        }
                        Ipld::Map(link)
                    })
                    .collect();
                map.insert("Links".to_string(), Ipld::List(links));
                Ipld::Map(map)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digests::{compute_cid, HashAlg};
    use cid::Version;

    #[test]
    fn unknown_code_is_unsupported() {
        assert_eq!(
            Err(Error::UnsupportedFormat(0x0129)),
            decode(0x0129, b"{}")
        );
    }

    #[test]
    fn raw_has_no_links() {
        let node = decode(Codec::Raw.code(), b"abc").unwrap();
        assert_eq!(Node::Raw(Bytes::from_static(b"abc")), node);
        assert!(links(&node).is_empty());
        assert_eq!(b"abc".to_vec(), encode(&node).unwrap());
    }

    #[test]
    fn dag_pb_unnamed_links_use_index() {
        let child = compute_cid(b"c", Codec::Raw, HashAlg::Sha2_256, Version::V1).unwrap();
        let node = Node::DagPb(PbNode {
            data: None,
            links: vec![
                PbLink::new(child, "", 1),
                PbLink::new(child, "named", 1),
                PbLink {
                    cid: child,
                    name: None,
                    tsize: None,
                },
            ],
        });

        let names: Vec<_> = links(&node).into_iter().map(|l| l.name).collect();
        assert_eq!(vec!["0", "named", "2"], names);

        let decoded = decode(Codec::DagPb.code(), &encode(&node).unwrap()).unwrap();
        assert_eq!(node, decoded);
    }

    #[test]
    fn codec_names() {
        for codec in [Codec::Raw, Codec::DagPb, Codec::DagCbor] {
            assert_eq!(codec, codec.to_string().parse().unwrap());
            assert_eq!(codec, Codec::try_from(codec.code()).unwrap());
        }
        assert!("json".parse::<Codec>().is_err());
    }

    #[test]
    fn dag_pb_ipld_view() {
        let child = compute_cid(b"c", Codec::Raw, HashAlg::Sha2_256, Version::V1).unwrap();
        let node = Node::DagPb(PbNode {
            data: Some(Bytes::from_static(b"d")),
            links: vec![PbLink::new(child, "c", 1)],
        });
        let view = node.to_ipld();
        assert_eq!(
            Some(&Ipld::Bytes(b"d".to_vec())),
            dag_cbor::lookup(&view, "Data")
        );
        let link = dag_cbor::lookup(&view, "Links")
            .and_then(|l| dag_cbor::lookup(l, "0"))
            .and_then(|l| dag_cbor::lookup(l, "Hash"));
        assert_eq!(Some(&Ipld::Link(child)), link);
    }
}
