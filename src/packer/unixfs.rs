//! Encoding of UnixFS file nodes as dag-pb blocks.
//!
//! Only what the file importer produces is supported: internal `File` nodes
//! whose links point at raw leaves or other `File` nodes. Links are emitted
//! before the data section, as canonical dag-pb requires.

use bytes::Bytes;

use crate::models::cid::Cid;

const UNIXFS_TYPE_FILE: u64 = 2;

// protobuf wire types
const VARINT: u64 = 0;
const LENGTH_DELIMITED: u64 = 2;

/// A link from an internal node to one of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLink {
    pub cid: Cid,
    /// Bytes of file content reachable below the child.
    pub file_size: u64,
    /// Cumulative encoded size of the child and everything below it.
    pub tsize: u64,
}

/// An internal node being filled with links by the layout.
#[derive(Debug, Default)]
pub struct FileNode {
    links: Vec<NodeLink>,
}

impl FileNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_child(&mut self, link: NodeLink) {
        self.links.push(link);
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn file_size(&self) -> u64 {
        self.links.iter().map(|l| l.file_size).sum()
    }

    /// Serialized dag-pb bytes of this node.
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(self.links.len() * 48 + 32);

        for link in &self.links {
            let encoded_link = encode_link(link);
            write_key(&mut out, 2, LENGTH_DELIMITED);
            write_varint(&mut out, encoded_link.len() as u64);
            out.extend_from_slice(&encoded_link);
        }

        let data = self.encode_unixfs_data();
        write_key(&mut out, 1, LENGTH_DELIMITED);
        write_varint(&mut out, data.len() as u64);
        out.extend_from_slice(&data);

        Bytes::from(out)
    }

    /// Link to this node once encoded as `encoded` under `cid`.
    pub fn link(&self, cid: Cid, encoded: &[u8]) -> NodeLink {
        NodeLink {
            cid,
            file_size: self.file_size(),
            tsize: encoded.len() as u64 + self.links.iter().map(|l| l.tsize).sum::<u64>(),
        }
    }

    fn encode_unixfs_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.links.len() * 4 + 16);
        write_key(&mut out, 1, VARINT);
        write_varint(&mut out, UNIXFS_TYPE_FILE);
        write_key(&mut out, 3, VARINT);
        write_varint(&mut out, self.file_size());
        for link in &self.links {
            write_key(&mut out, 4, VARINT);
            write_varint(&mut out, link.file_size);
        }
        out
    }
}

fn encode_link(link: &NodeLink) -> Vec<u8> {
    let cid = link.cid.to_bytes();
    let mut out = Vec::with_capacity(cid.len() + 16);
    write_key(&mut out, 1, LENGTH_DELIMITED);
    write_varint(&mut out, cid.len() as u64);
    out.extend_from_slice(&cid);
    // empty name
    write_key(&mut out, 2, LENGTH_DELIMITED);
    write_varint(&mut out, 0);
    write_key(&mut out, 3, VARINT);
    write_varint(&mut out, link.tsize);
    out
}

fn write_key(out: &mut Vec<u8>, field: u64, wire_type: u64) {
    write_varint(out, (field << 3) | wire_type);
}

fn write_varint(out: &mut Vec<u8>, n: u64) {
    out.extend_from_slice(unsigned_varint::encode::u64(n, &mut unsigned_varint::encode::u64_buffer()));
}
