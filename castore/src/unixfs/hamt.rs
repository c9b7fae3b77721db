//! Hash array mapped trie layout of sharded UnixFS directories.
//!
//! Entry names are hashed with murmur3 (x64, 128 bit, seed 0, first 64 bits
//! in big-endian order). Each shard level consumes `log2(fanout)` bits of
//! the hash, most significant first, to pick a slot. A link is named by the
//! slot index as upper-case hex, padded to the width of `fanout - 1`,
//! followed by the entry name when it points at an entry rather than at a
//! child shard.

use std::io::Cursor;

use cid::Cid;

use crate::codec::{DataType, PbNode, UnixFs};
use crate::Error;

pub const DEFAULT_FANOUT: u64 = 256;

/// Hashes a directory entry name.
pub fn hash_name(name: &str) -> [u8; 8] {
    // reading from an in-memory cursor can't fail.
    let h = murmur3::murmur3_x64_128(&mut Cursor::new(name.as_bytes()), 0).unwrap_or_default();
    (h as u64).to_be_bytes()
}

/// Consumes a hash a few bits at a time.
#[derive(Clone, Debug)]
pub struct HashBits {
    hash: [u8; 8],
    consumed: usize,
}

impl HashBits {
    pub fn new(name: &str) -> Self {
        Self {
            hash: hash_name(name),
            consumed: 0,
        }
    }

    /// Returns the next `n` bits as an index, or an error once the hash is
    /// exhausted.
    pub fn next(&mut self, n: usize) -> Result<usize, Error> {
        if self.consumed + n > self.hash.len() * 8 {
            return Err(Error::ShardingLimitExceeded(
                "hash bits exhausted, too many shard levels".to_string(),
            ));
        }
        let mut out = 0usize;
        for _ in 0..n {
            let byte = self.hash[self.consumed / 8];
            let bit = (byte >> (7 - self.consumed % 8)) & 1;
            out = (out << 1) | bit as usize;
            self.consumed += 1;
        }
        Ok(out)
    }
}

/// Shape parameters derived from a fanout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub fanout: u64,
    pub bits: usize,
    pub pad: usize,
}

impl Layout {
    /// Validates `fanout`: a power of two between 8 and 256.
    pub fn new(fanout: u64) -> Result<Self, Error> {
        if !fanout.is_power_of_two() || !(8..=256).contains(&fanout) {
            return Err(Error::ShardingLimitExceeded(format!(
                "invalid shard fanout {}, must be a power of two between 8 and 256",
                fanout
            )));
        }
        Ok(Self {
            fanout,
            bits: fanout.trailing_zeros() as usize,
            pad: format!("{:X}", fanout - 1).len(),
        })
    }

    /// Layout of a shard node, checking its metadata.
    pub fn from_node(unixfs: &UnixFs) -> Result<Self, Error> {
        if unixfs.kind != DataType::HamtShard {
            return Err(Error::MalformedNode("not a hamt shard".to_string()));
        }
        let fanout = unixfs
            .fanout
            .ok_or_else(|| Error::MalformedNode("hamt shard without fanout".to_string()))?;
        Self::new(fanout).map_err(|e| Error::MalformedNode(e.to_string()))
    }

    pub fn prefix(&self, slot: usize) -> String {
        format!("{:0width$X}", slot, width = self.pad)
    }

    /// The occupancy bitfield for the given slots, big-endian, one bit per
    /// slot.
    pub fn bitfield(&self, slots: impl IntoIterator<Item = usize>) -> Vec<u8> {
        let len = (self.fanout as usize).div_ceil(8);
        let mut out = vec![0u8; len];
        for slot in slots {
            out[len - 1 - slot / 8] |= 1 << (slot % 8);
        }
        out
    }
}

/// What a link of a shard node points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShardLink<'a> {
    /// A directory entry, with the name it has in the directory.
    Entry(&'a str),
    /// A child shard.
    Shard,
}

/// Splits a shard link name into its slot prefix and the entry name.
pub fn parse_link_name<'a>(layout: &Layout, name: &'a str) -> Result<(usize, ShardLink<'a>), Error> {
    if name.len() < layout.pad || !name.is_char_boundary(layout.pad) {
        return Err(Error::MalformedNode(format!(
            "invalid hamt link name {:?}",
            name
        )));
    }
    let (prefix, rest) = name.split_at(layout.pad);
    let slot = usize::from_str_radix(prefix, 16)
        .map_err(|_| Error::MalformedNode(format!("invalid hamt link name {:?}", name)))?;
    if rest.is_empty() {
        Ok((slot, ShardLink::Shard))
    } else {
        Ok((slot, ShardLink::Entry(rest)))
    }
}

/// The outcome of looking a name up in one shard node.
pub enum Step {
    Found(Cid),
    /// Continue in the child shard.
    Descend(Cid),
    Missing,
}

/// Looks `name` up in a single shard node. `bits` carries the hash state
/// across levels.
pub fn lookup_step(node: &PbNode, layout: &Layout, bits: &mut HashBits, name: &str) -> Result<Step, Error> {
    let slot = bits.next(layout.bits)?;
    for link in &node.links {
        let link_name = link.name.as_deref().unwrap_or_default();
        let (link_slot, kind) = parse_link_name(layout, link_name)?;
        if link_slot != slot {
            continue;
        }
        return Ok(match kind {
            ShardLink::Shard => Step::Descend(link.cid),
            ShardLink::Entry(entry) if entry == name => Step::Found(link.cid),
            ShardLink::Entry(_) => Step::Missing,
        });
    }
    Ok(Step::Missing)
}
