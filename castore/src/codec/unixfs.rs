//! The UnixFS message carried in the `Data` field of dag-pb nodes.

use bytes::Bytes;
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::Error;

pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o755;

/// `hashType` recorded in HAMT shard nodes (murmur3-x64-64).
pub const HAMT_HASH_TYPE: u64 = 0x22;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
    Raw = 0,
    Directory = 1,
    File = 2,
    Metadata = 3,
    Symlink = 4,
    HamtShard = 5,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Raw => "raw",
            DataType::Directory => "directory",
            DataType::File => "file",
            DataType::Metadata => "metadata",
            DataType::Symlink => "symlink",
            DataType::HamtShard => "hamt-sharded-directory",
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, DataType::Directory | DataType::HamtShard)
    }

    fn default_mode(&self) -> u32 {
        if self.is_directory() {
            DEFAULT_DIRECTORY_MODE
        } else {
            DEFAULT_FILE_MODE
        }
    }
}

mod proto {
    use bytes::Bytes;

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Data {
        #[prost(enumeration = "super::DataType", required, tag = "1")]
        pub r#type: i32,
        #[prost(bytes = "bytes", optional, tag = "2")]
        pub data: Option<Bytes>,
        #[prost(uint64, optional, tag = "3")]
        pub filesize: Option<u64>,
        #[prost(uint64, repeated, packed = "false", tag = "4")]
        pub blocksizes: Vec<u64>,
        #[prost(uint64, optional, tag = "5")]
        pub hash_type: Option<u64>,
        #[prost(uint64, optional, tag = "6")]
        pub fanout: Option<u64>,
        #[prost(uint32, optional, tag = "7")]
        pub mode: Option<u32>,
        #[prost(message, optional, tag = "8")]
        pub mtime: Option<UnixTime>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct UnixTime {
        #[prost(int64, required, tag = "1")]
        pub seconds: i64,
        #[prost(fixed32, optional, tag = "2")]
        pub fractional_nanoseconds: Option<u32>,
    }
}

/// Modification time of a UnixFS entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mtime {
    pub secs: i64,
    #[serde(default)]
    pub nsecs: u32,
}

impl Mtime {
    pub fn new(secs: i64, nsecs: u32) -> Self {
        Self { secs, nsecs }
    }
}

/// A decoded UnixFS message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnixFs {
    pub kind: DataType,
    pub data: Option<Bytes>,
    pub blocksizes: Vec<u64>,
    pub hash_type: Option<u64>,
    pub fanout: Option<u64>,
    pub mode: Option<u32>,
    pub mtime: Option<Mtime>,
}

impl UnixFs {
    pub fn new(kind: DataType) -> Self {
        Self {
            kind,
            data: None,
            blocksizes: vec![],
            hash_type: None,
            fanout: None,
            mode: None,
            mtime: None,
        }
    }

    pub fn file(data: Bytes) -> Self {
        Self {
            data: Some(data),
            ..Self::new(DataType::File)
        }
    }

    pub fn directory() -> Self {
        Self::new(DataType::Directory)
    }

    /// A shard node, `bitfield` is the big-endian occupancy map of the
    /// shard's slots.
    pub fn hamt_shard(bitfield: Vec<u8>, fanout: u64) -> Self {
        Self {
            data: Some(bitfield.into()),
            hash_type: Some(HAMT_HASH_TYPE),
            fanout: Some(fanout),
            ..Self::new(DataType::HamtShard)
        }
    }

    pub fn with_metadata(mut self, mode: Option<u32>, mtime: Option<Mtime>) -> Self {
        self.mode = mode.map(|m| m & 0o7777);
        self.mtime = mtime;
        self
    }

    /// The mode of the entry, falling back to the type's default.
    pub fn mode(&self) -> u32 {
        self.mode.unwrap_or_else(|| self.kind.default_mode())
    }

    /// Size of the file content described by this node and its children.
    ///
    /// Fails with [Error::MalformedNode] if the sizes don't fit a u64.
    pub fn file_size(&self) -> Result<u64, Error> {
        let data_len = self.data.as_ref().map_or(0, |d| d.len() as u64);
        self.blocksizes
            .iter()
            .try_fold(data_len, |acc, size| acc.checked_add(*size))
            .ok_or_else(|| Error::MalformedNode("file size overflows".to_string()))
    }

    pub fn encode(&self) -> Bytes {
        let is_file = matches!(self.kind, DataType::File | DataType::Raw);

        let msg = proto::Data {
            r#type: self.kind as i32,
            data: self.data.clone().filter(|d| !d.is_empty()),
            filesize: is_file.then(|| self.file_size().ok()).flatten(),
            blocksizes: self.blocksizes.clone(),
            hash_type: self.hash_type,
            fanout: self.fanout,
            mode: self.mode.filter(|m| *m != self.kind.default_mode()),
            mtime: self.mtime.map(|m| proto::UnixTime {
                seconds: m.secs,
                fractional_nanoseconds: (m.nsecs != 0).then_some(m.nsecs),
            }),
        };

        msg.encode_to_vec().into()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let msg = proto::Data::decode(buf)
            .map_err(|e| Error::MalformedNode(format!("invalid unixfs data: {}", e)))?;

        let kind = DataType::try_from(msg.r#type)
            .map_err(|e| Error::MalformedNode(format!("invalid unixfs type: {}", e)))?;

        if let Some(nsecs) = msg.mtime.as_ref().and_then(|m| m.fractional_nanoseconds) {
            if nsecs > 999_999_999 {
                return Err(Error::MalformedNode(format!(
                    "invalid unixfs mtime nanoseconds: {}",
                    nsecs
                )));
            }
        }

        Ok(Self {
            kind,
            data: msg.data,
            blocksizes: msg.blocksizes,
            hash_type: msg.hash_type,
            fanout: msg.fanout,
            mode: msg.mode.map(|m| m & 0o7777),
            mtime: msg.mtime.map(|m| Mtime {
                secs: m.seconds,
                nsecs: m.fractional_nanoseconds.unwrap_or(0),
            }),
        })
    }
}
