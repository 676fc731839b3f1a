//! Balanced DAG layout over fixed-size chunks.
//!
//! Leaves are raw blocks holding one chunk each. Internal nodes hold up to
//! `max_links` children. The tree grows a level at a time: the current root
//! becomes the first child of a new root, whose remaining slots are filled
//! depth-first with subtrees of the previous depth. A single chunk is its
//! own root.

use std::io;
use std::io::Read;

use bytes::Bytes;

use super::blockstore::Block;
use super::blockstore::BlockStore;
use super::unixfs::FileNode;
use super::unixfs::NodeLink;
use crate::models::cid;
use crate::models::cid::Cid;
use crate::models::cid::DAG_PB;
use crate::models::cid::RAW;

pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;
pub const DEFAULT_LINKS_PER_LEVEL: usize = 1024;
/// Blocks up to this many bytes are inlined into an identity cid.
pub const DEFAULT_INLINE_LIMIT: usize = 126;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DagParams {
    pub chunk_size: usize,
    pub max_links: usize,
    pub inline_limit: usize,
}

impl Default for DagParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_links: DEFAULT_LINKS_PER_LEVEL,
            inline_limit: DEFAULT_INLINE_LIMIT,
        }
    }
}

impl DagParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk size must be positive".to_string());
        }
        if self.max_links < 2 {
            return Err(format!(
                "at least two links per node are required, got {}",
                self.max_links
            ));
        }
        if self.inline_limit > cid::MAX_DIGEST_SIZE {
            return Err(format!(
                "inline limit {} exceeds the {} byte identity digest",
                self.inline_limit,
                cid::MAX_DIGEST_SIZE
            ));
        }
        Ok(())
    }
}

/// Chunk `source`, write every block of the resulting DAG to `store` and
/// return the root.
pub fn build_dag<R: Read, S: BlockStore>(
    source: R,
    store: &mut S,
    params: &DagParams,
) -> io::Result<Cid> {
    let mut builder = DagBuilder::new(source, store, *params)?;
    let root = builder.balanced_layout()?;
    Ok(root.cid)
}

struct DagBuilder<'a, R, S> {
    reader: R,
    store: &'a mut S,
    params: DagParams,
    // one chunk of lookahead so we know when the input is exhausted
    next: Option<Vec<u8>>,
}

impl<'a, R: Read, S: BlockStore> DagBuilder<'a, R, S> {
    fn new(reader: R, store: &'a mut S, params: DagParams) -> io::Result<Self> {
        let mut builder = Self {
            reader,
            store,
            params,
            next: None,
        };
        builder.next = builder.read_chunk()?;
        Ok(builder)
    }

    fn read_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.params.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }

    fn is_done(&self) -> bool {
        self.next.is_none()
    }

    fn cid_for(&self, codec: u64, data: &[u8]) -> io::Result<Cid> {
        let cid = if data.len() <= self.params.inline_limit {
            cid::identity(codec, data)
        } else {
            cid::blake2b_256(codec, data)
        };
        cid.map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    fn new_leaf(&mut self) -> io::Result<NodeLink> {
        let data = self.next.take().unwrap_or_default();
        self.next = self.read_chunk()?;

        let cid = self.cid_for(RAW, &data)?;
        let size = data.len() as u64;
        self.store.put(Block::new(cid, Bytes::from(data)))?;
        Ok(NodeLink {
            cid,
            file_size: size,
            tsize: size,
        })
    }

    fn commit(&mut self, node: FileNode) -> io::Result<NodeLink> {
        let encoded = node.encode();
        let cid = self.cid_for(DAG_PB, &encoded)?;
        let link = node.link(cid, &encoded);
        self.store.put(Block::new(cid, encoded))?;
        Ok(link)
    }

    fn balanced_layout(&mut self) -> io::Result<NodeLink> {
        let mut root = self.new_leaf()?;

        let mut depth = 1;
        while !self.is_done() {
            let mut new_root = FileNode::new();
            new_root.add_child(root);
            self.fill_node(&mut new_root, depth)?;
            root = self.commit(new_root)?;
            depth += 1;
        }

        Ok(root)
    }

    fn fill_node(&mut self, node: &mut FileNode, depth: usize) -> io::Result<()> {
        while node.link_count() < self.params.max_links && !self.is_done() {
            let child = if depth == 1 {
                self.new_leaf()?
            } else {
                let mut child = FileNode::new();
                self.fill_node(&mut child, depth - 1)?;
                self.commit(child)?
            };
            node.add_child(child);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::collection::vec;
    use proptest::prop_assert_eq;
    use test_strategy::proptest;

    use super::*;
    use crate::packer::blockstore::MemoryBlockStore;

    /// Records nothing but the order of cids it was handed.
    #[derive(Default)]
    struct TraceStore(Vec<Cid>);

    impl BlockStore for TraceStore {
        fn put(&mut self, block: Block) -> io::Result<()> {
            self.0.push(*block.cid());
            Ok(())
        }

        fn has(&self, cid: &Cid) -> bool {
            self.0.contains(cid)
        }
    }

    fn params(chunk_size: usize, max_links: usize, inline_limit: usize) -> DagParams {
        DagParams {
            chunk_size,
            max_links,
            inline_limit,
        }
    }

    #[test]
    fn single_chunk_is_a_raw_root() {
        let data = vec![9u8; 1000];
        let mut store = MemoryBlockStore::new();
        let root = build_dag(&data[..], &mut store, &params(4096, 8, 126)).unwrap();

        assert_eq!(RAW, root.codec());
        assert_eq!(cid::blake2b_256(RAW, &data).unwrap(), root);
        assert_eq!(cid::BLAKE2B_256, root.hash().code());
        assert_eq!(1, store.len());
    }

    #[test]
    fn tiny_content_is_inlined() {
        let mut store = MemoryBlockStore::new();
        let root = build_dag(&b"hello"[..], &mut store, &DagParams::default()).unwrap();
        assert!(cid::is_inline(&root));
        assert_eq!(b"hello", root.hash().digest());
    }

    #[test]
    fn five_chunks_with_two_links_grow_three_levels() {
        // 5 distinct 4-byte chunks
        let data: Vec<u8> = (0u8..20).collect();
        let mut store = MemoryBlockStore::new();
        let root = build_dag(&data[..], &mut store, &params(4, 2, 0)).unwrap();

        assert_eq!(DAG_PB, root.codec());
        // 5 leaves, (l1 l2), (l3 l4), root2, (l5), ((l5)), root3
        assert_eq!(11, store.len());
        assert!(store.has(&root));
    }

    #[test]
    fn fan_out_is_bounded() {
        let data: Vec<u8> = (0..=255u8).cycle().take(64 * 10).collect();
        let mut store = TraceStore::default();
        let root = build_dag(&data[..], &mut store, &params(64, 3, 0)).unwrap();

        // root is written last
        assert_eq!(Some(&root), store.0.last());
        // 10 leaves, internal nodes of at most 3 links: 10 -> 4 -> 2 -> 1
        assert!(store.0.len() >= 10 + 4 + 2 + 1);
    }

    #[test]
    fn invalid_params_are_reported() {
        assert!(params(0, 2, 0).validate().is_err());
        assert!(params(1, 1, 0).validate().is_err());
        assert!(params(1, 2, cid::MAX_DIGEST_SIZE + 1).validate().is_err());
        assert!(DagParams::default().validate().is_ok());
    }

    #[proptest(cases = 64)]
    fn layout_is_deterministic_and_store_independent(
        #[strategy(vec(proptest::num::u8::ANY, 1..4096))] data: Vec<u8>,
        #[strategy(1usize..512)] chunk_size: usize,
        #[strategy(2usize..8)] max_links: usize,
    ) {
        let p = params(chunk_size, max_links, 16);

        let mut staged = MemoryBlockStore::new();
        let first = build_dag(&data[..], &mut staged, &p).unwrap();
        let mut traced = TraceStore::default();
        let second = build_dag(&data[..], &mut traced, &p).unwrap();

        prop_assert_eq!(first, second);
    }
}
