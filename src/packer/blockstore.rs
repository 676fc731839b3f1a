use std::collections::HashMap;
use std::io;

use bytes::Bytes;

use crate::models::cid::Cid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    cid: Cid,
    data: Bytes,
}

impl Block {
    pub fn new(cid: Cid, data: Bytes) -> Self {
        Self { cid, data }
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// Destination for the blocks of a DAG under construction.
///
/// The DAG layout never depends on which store it writes to; the two-pass
/// packager relies on that to compare roots built against different stores.
pub trait BlockStore {
    fn put(&mut self, block: Block) -> io::Result<()>;

    fn has(&self, cid: &Cid) -> bool;
}

/// In-memory staging store.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: HashMap<Cid, Bytes>,
}

impl MemoryBlockStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blocks held.
    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }
}

impl BlockStore for MemoryBlockStore {
    fn put(&mut self, block: Block) -> io::Result<()> {
        self.blocks.entry(block.cid).or_insert(block.data);
        Ok(())
    }

    fn has(&self, cid: &Cid) -> bool {
        self.blocks.contains_key(cid)
    }
}
