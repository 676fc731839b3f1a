//! File-backed block store producing a CARv2 archive.
//!
//! Layout on disk:
//!
//! ```text
//! pragma (11) | header (40) | CARv1 payload | index
//! ```
//!
//! The CARv1 payload starts with a dag-cbor `{roots, version: 1}` header, so
//! the roots must be known when the store is opened. Each block follows as a
//! section `varint(len(cid) + len(data)) || cid || data`. Identity cids are
//! never written and duplicate puts are ignored. `finalize` appends a
//! `MultihashIndexSorted` index and rewrites the fixed header with the final
//! payload size and index offset.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::BufWriter;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use serde_cbor::tags::Tagged;
use serde_cbor::Value;
use tracing::debug;

use super::blockstore::Block;
use super::blockstore::BlockStore;
use crate::models::cid;
use crate::models::cid::Cid;

pub const CARV2_PRAGMA: [u8; 11] = [
    0x0a, 0xa1, 0x67, 0x76, 0x65, 0x72, 0x73, 0x69, 0x6f, 0x6e, 0x02,
];
pub const CARV2_HEADER_LEN: u64 = 40;
/// Offset of the CARv1 payload within the file.
pub const CARV1_DATA_OFFSET: u64 = CARV2_PRAGMA.len() as u64 + CARV2_HEADER_LEN;

const MULTIHASH_INDEX_SORTED: u64 = 0x0401;
const CBOR_TAG_CID: u64 = 42;

const WRITE_BUFFER_SIZE: usize = 1 << 20;

#[derive(Debug)]
pub struct CarBlockStore {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Bytes of CARv1 payload written so far.
    data_size: u64,
    written: HashSet<Cid>,
    /// multihash code -> entry width -> (digest, offset) entries
    index: BTreeMap<u64, BTreeMap<u32, Vec<(Vec<u8>, u64)>>>,
}

impl CarBlockStore {
    /// Truncate or create `path` and write everything up to the first block.
    pub fn create(path: &Path, roots: &[Cid]) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

        writer.write_all(&CARV2_PRAGMA)?;
        // rewritten by finalize()
        writer.write_all(&[0u8; CARV2_HEADER_LEN as usize])?;

        let header = encode_v1_header(roots)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut section = Vec::with_capacity(header.len() + 2);
        write_varint(&mut section, header.len() as u64);
        section.extend_from_slice(&header);
        writer.write_all(&section)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            data_size: section.len() as u64,
            written: HashSet::new(),
            index: BTreeMap::new(),
        })
    }

    /// Write the index and the final header, then flush to disk.
    pub fn finalize(mut self) -> io::Result<()> {
        let index_offset = CARV1_DATA_OFFSET + self.data_size;
        let index = self.encode_index();
        self.writer.write_all(&index)?;

        let mut file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(CARV2_PRAGMA.len() as u64))?;
        file.write_all(&encode_v2_header(self.data_size, index_offset))?;
        file.sync_all()?;

        debug!(
            path = %self.path.display(),
            blocks = self.written.len(),
            data_size = self.data_size,
            "sealed archive"
        );
        Ok(())
    }

    fn encode_index(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, MULTIHASH_INDEX_SORTED);
        out.extend_from_slice(&(self.index.len() as i32).to_le_bytes());
        for (code, by_width) in &mut self.index {
            out.extend_from_slice(&code.to_le_bytes());
            out.extend_from_slice(&(by_width.len() as i32).to_le_bytes());
            for (width, entries) in by_width.iter_mut() {
                entries.sort();
                out.extend_from_slice(&width.to_le_bytes());
                out.extend_from_slice(&((entries.len() as u64 * u64::from(*width)) as i64).to_le_bytes());
                for (digest, offset) in entries.iter() {
                    out.extend_from_slice(digest);
                    out.extend_from_slice(&offset.to_le_bytes());
                }
            }
        }
        out
    }
}

impl BlockStore for CarBlockStore {
    fn put(&mut self, block: Block) -> io::Result<()> {
        if cid::is_inline(block.cid()) || self.written.contains(block.cid()) {
            return Ok(());
        }

        let cid_bytes = block.cid().to_bytes();
        let mut head = Vec::with_capacity(cid_bytes.len() + 10);
        write_varint(&mut head, (cid_bytes.len() + block.data().len()) as u64);
        head.extend_from_slice(&cid_bytes);

        let offset = self.data_size;
        self.writer.write_all(&head)?;
        self.writer.write_all(block.data())?;
        self.data_size += (head.len() + block.data().len()) as u64;

        let hash = block.cid().hash();
        let width = (hash.digest().len() + 8) as u32;
        self.index
            .entry(hash.code())
            .or_default()
            .entry(width)
            .or_default()
            .push((hash.digest().to_vec(), offset));
        self.written.insert(*block.cid());
        Ok(())
    }

    fn has(&self, cid: &Cid) -> bool {
        self.written.contains(cid)
    }
}

fn encode_v2_header(data_size: u64, index_offset: u64) -> [u8; CARV2_HEADER_LEN as usize] {
    let mut header = [0u8; CARV2_HEADER_LEN as usize];
    // bytes 0..16 are the characteristics bitfield, all unset
    header[16..24].copy_from_slice(&CARV1_DATA_OFFSET.to_le_bytes());
    header[24..32].copy_from_slice(&data_size.to_le_bytes());
    header[32..40].copy_from_slice(&index_offset.to_le_bytes());
    header
}

/// CARv1 header. Field order matches dag-cbor's canonical key order.
#[derive(Serialize)]
struct CarHeader {
    roots: Vec<Tagged<Value>>,
    version: u64,
}

/// dag-cbor `{"roots": [..], "version": 1}`, each root under the cid tag.
pub fn encode_v1_header(roots: &[Cid]) -> Result<Vec<u8>, serde_cbor::Error> {
    let roots = roots
        .iter()
        .map(|root| {
            // multibase identity prefix required by the cid tag
            let mut bytes = vec![0x00];
            bytes.extend_from_slice(&root.to_bytes());
            Tagged::new(Some(CBOR_TAG_CID), Value::Bytes(bytes))
        })
        .collect();
    serde_cbor::to_vec(&CarHeader { roots, version: 1 })
}

fn write_varint(out: &mut Vec<u8>, n: u64) {
    out.extend_from_slice(unsigned_varint::encode::u64(n, &mut unsigned_varint::encode::u64_buffer()));
}

#[cfg(test)]
pub(crate) mod tests {
    use bytes::Bytes;

    use std::io::Cursor;

    use super::*;
    use crate::models::cid::RAW;

    /// Parsed view of an archive written by `CarBlockStore`.
    #[derive(Debug)]
    pub(crate) struct ParsedCar {
        pub header_section: Vec<u8>,
        pub blocks: Vec<(Cid, Vec<u8>)>,
        pub data_size: u64,
        pub index_offset: u64,
    }

    pub(crate) fn parse_car(path: &Path) -> ParsedCar {
        let bytes = std::fs::read(path).unwrap();
        assert_eq!(&CARV2_PRAGMA[..], &bytes[..11]);
        let field = |at: usize| u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap());
        assert_eq!(CARV1_DATA_OFFSET, field(11 + 16));
        let data_size = field(11 + 24);
        let index_offset = field(11 + 32);
        assert_eq!(CARV1_DATA_OFFSET + data_size, index_offset);

        let data = &bytes[CARV1_DATA_OFFSET as usize..index_offset as usize];
        let (header_len, rest) = unsigned_varint::decode::u64(data).unwrap();
        let header_section = rest[..header_len as usize].to_vec();

        let mut blocks = vec![];
        let mut rest = &rest[header_len as usize..];
        while !rest.is_empty() {
            let (len, after) = unsigned_varint::decode::u64(rest).unwrap();
            let section = &after[..len as usize];
            let mut cursor = Cursor::new(section);
            let cid = Cid::read_bytes(&mut cursor).unwrap();
            blocks.push((cid, section[cursor.position() as usize..].to_vec()));
            rest = &after[len as usize..];
        }

        ParsedCar {
            header_section,
            blocks,
            data_size,
            index_offset,
        }
    }

    #[test]
    fn header_encodes_root_with_cid_tag() {
        let root = cid::blake2b_256(RAW, b"root").unwrap();
        let header = encode_v1_header(&[root]).unwrap();
        // map(2), "roots", array(1), tag(42)
        assert_eq!(&[0xa2, 0x65], &header[..2]);
        assert_eq!(b"roots", &header[2..7]);
        assert_eq!(&[0x81, 0xd8, 0x2a], &header[7..10]);
        assert!(header.ends_with(&[0x67, b'v', b'e', b'r', b's', b'i', b'o', b'n', 0x01]));
        let needle = root.to_bytes();
        assert!(header.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn header_decodes_as_tagged_cbor() {
        let roots = [
            cid::blake2b_256(RAW, b"first").unwrap(),
            cid::sha2_256(RAW, b"second").unwrap(),
        ];
        let header = encode_v1_header(&roots).unwrap();

        let Value::Map(map) = serde_cbor::from_slice::<Value>(&header).unwrap() else {
            panic!("header is not a map");
        };
        assert_eq!(
            Some(&Value::Integer(1)),
            map.get(&Value::Text("version".to_string()))
        );
        let Some(Value::Array(decoded)) = map.get(&Value::Text("roots".to_string())) else {
            panic!("roots missing");
        };
        assert_eq!(roots.len(), decoded.len());
        for (root, value) in roots.iter().zip(decoded) {
            let Value::Tag(tag, inner) = value else {
                panic!("root is not tagged");
            };
            assert_eq!(CBOR_TAG_CID, *tag);
            let Value::Bytes(bytes) = inner.as_ref() else {
                panic!("tagged root is not a byte string");
            };
            assert_eq!(0x00, bytes[0]);
            assert_eq!(*root, Cid::try_from(&bytes[1..]).unwrap());
        }
    }

    #[test]
    fn stores_blocks_once_and_skips_inline_cids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.car");
        let a = Block::new(
            cid::blake2b_256(RAW, &[1u8; 200]).unwrap(),
            Bytes::from(vec![1u8; 200]),
        );
        let b = Block::new(
            cid::blake2b_256(RAW, &[2u8; 300]).unwrap(),
            Bytes::from(vec![2u8; 300]),
        );
        let inline = Block::new(cid::identity(RAW, b"tiny").unwrap(), Bytes::from_static(b"tiny"));

        let mut store = CarBlockStore::create(&path, &[*a.cid()]).unwrap();
        store.put(a.clone()).unwrap();
        store.put(b.clone()).unwrap();
        store.put(a.clone()).unwrap();
        store.put(inline.clone()).unwrap();
        assert!(store.has(a.cid()));
        assert!(!store.has(inline.cid()));
        store.finalize().unwrap();

        let parsed = parse_car(&path);
        assert_eq!(encode_v1_header(&[*a.cid()]).unwrap(), parsed.header_section);
        assert_eq!(
            vec![(*a.cid(), a.data().to_vec()), (*b.cid(), b.data().to_vec())],
            parsed.blocks
        );

        // index: codec, one multihash code (blake2b-256), one width of 32 + 8
        let bytes = std::fs::read(&path).unwrap();
        let index = &bytes[parsed.index_offset as usize..];
        let (codec, rest) = unsigned_varint::decode::u64(index).unwrap();
        let n = index.len() - rest.len();
        assert_eq!(MULTIHASH_INDEX_SORTED, codec);
        assert_eq!(1, i32::from_le_bytes(index[n..n + 4].try_into().unwrap()));
        assert_eq!(
            cid::BLAKE2B_256,
            u64::from_le_bytes(index[n + 4..n + 12].try_into().unwrap())
        );
        assert_eq!(1, i32::from_le_bytes(index[n + 12..n + 16].try_into().unwrap()));
        assert_eq!(40, u32::from_le_bytes(index[n + 16..n + 20].try_into().unwrap()));
        assert_eq!(80, i64::from_le_bytes(index[n + 20..n + 28].try_into().unwrap()));
        assert_eq!(n + 28 + 80, index.len());
    }
}
