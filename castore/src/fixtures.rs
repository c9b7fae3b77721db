use std::collections::BTreeMap;

use bytes::Bytes;
use cid::{Cid, Version};
use ipld_core::ipld::Ipld;
use lazy_static::lazy_static;

use crate::{
    blockstore::BlockStore,
    codec::{self, Codec, Node, PbLink, PbNode, UnixFs},
    digests::{compute_cid, HashAlg},
};

lazy_static! {
    // 2 bytes
    pub static ref BLOB_A: Bytes = vec![0x00, 0x01].into();
    pub static ref BLOB_A_CID: Cid = raw_cid(&BLOB_A);

    // 1MB
    pub static ref BLOB_B: Bytes = (0..255).collect::<Vec<u8>>().repeat(4 * 1024).into();
    pub static ref BLOB_B_CID: Cid = raw_cid(&BLOB_B);

    pub static ref EMPTY_DIRECTORY: Bytes = PbNode {
        data: Some(UnixFs::directory().encode()),
        links: vec![],
    }
    .encode()
    .into();
    pub static ref EMPTY_DIRECTORY_CID: Cid =
        "QmUNLLsPACCz1vLxQVkXqqLX5R1X345qqfHbsf67hvA3Nn".parse().unwrap();
}

pub fn raw_cid(data: &[u8]) -> Cid {
    compute_cid(data, Codec::Raw, HashAlg::Sha2_256, Version::V1).unwrap()
}

/// Encodes and stores `node`, returning its CID and its cumulative size.
pub async fn put_node(store: &dyn BlockStore, node: &Node) -> (Cid, u64) {
    let encoded = codec::encode(node).unwrap();
    let cumulative = match node {
        Node::DagPb(pb) => encoded.len() as u64 + pb.links_tsize(),
        _ => encoded.len() as u64,
    };
    let cid = store
        .put(
            encoded.into(),
            node.codec(),
            HashAlg::Sha2_256,
            Version::V1,
            false,
        )
        .await
        .unwrap();
    (cid, cumulative)
}

/// Stores a raw block.
pub async fn put_raw(store: &dyn BlockStore, data: &[u8]) -> (Cid, u64) {
    put_node(store, &Node::Raw(Bytes::copy_from_slice(data))).await
}

/// Stores a plain UnixFS directory with the given children.
pub async fn put_directory(store: &dyn BlockStore, children: &[(&str, (Cid, u64))]) -> (Cid, u64) {
    let node = Node::DagPb(PbNode {
        data: Some(UnixFs::directory().encode()),
        links: children
            .iter()
            .map(|(name, (cid, size))| PbLink::new(*cid, *name, *size))
            .collect(),
    });
    put_node(store, &node).await
}

/// Stores a dag-cbor map.
pub async fn put_cbor(store: &dyn BlockStore, entries: Vec<(&str, Ipld)>) -> Cid {
    let value = Ipld::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>(),
    );
    put_node(store, &Node::DagCbor(value)).await.0
}

/// Builds `/a/b/c` (a file containing `"c"`) next to `/a/d`, returning the
/// root CID and the CID of each node keyed by path.
pub async fn put_abc_tree(store: &dyn BlockStore) -> (Cid, BTreeMap<&'static str, Cid>) {
    let c = put_raw(store, b"c").await;
    let d = put_raw(store, b"d").await;
    let b = put_directory(store, &[("c", c)]).await;
    let a = put_directory(store, &[("b", b), ("d", d)]).await;
    let root = put_directory(store, &[("a", a)]).await;

    let nodes = BTreeMap::from([
        ("a", a.0),
        ("a/b", b.0),
        ("a/b/c", c.0),
        ("a/d", d.0),
    ]);
    (root.0, nodes)
}
