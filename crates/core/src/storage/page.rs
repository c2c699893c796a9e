//! Binary page codec for the index file.
//!
//! ```text
//! meta page (META_PAGE_SIZE bytes, offset 0)
//!   [magic "HNSWMETA"][u16 version][u8 metric][u8 heuristic][u32 dimensions]
//!   [u16 M][u16 pad][u32 ef_construction][u64 random_seed]
//!   [u32 entry_point (u32::MAX = none)][u32 pad][u64 node_count][u32 CRC32]
//!   zero padding
//!
//! node page (fixed size for a given layer count, appended after the meta page)
//!   [u32 magic][u32 id][u64 tuple][u8 layer_count][u8 tombstone][u16 pad]
//!   [f32 × dimensions]
//!   per layer: [u16 count][u32 × capacity(layer)]   unused slots = u32::MAX
//!   [u32 CRC32]
//! ```
//!
//! All integers are little-endian. A meta page whose body is all zero bytes
//! is an unpublished index.

use crate::config::{FORMAT_VERSION, META_MAGIC, META_PAGE_SIZE, NODE_MAGIC};
use crate::error::{HnswError, Result};
use crate::hnsw::distance::DistanceMetric;
use crate::hnsw::graph::HnswConfig;
use crate::hnsw::node::{layer_capacity, TupleId};

/// Bytes of the meta page covered by the checksum.
const META_BODY_LEN: usize = 48;

/// Fixed prefix of every node page, before the vector.
pub const NODE_HEADER_LEN: usize = 20;

const EMPTY_SLOT: u32 = u32::MAX;
const NO_ENTRY: u32 = u32::MAX;

/// Decoded meta page.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaPage {
    pub config: HnswConfig,
    pub entry_point: Option<u32>,
    pub node_count: u64,
}

/// Decoded node page.
#[derive(Debug, Clone, PartialEq)]
pub struct NodePage {
    pub id: u32,
    pub tuple: TupleId,
    pub tombstoned: bool,
    pub vector: Vec<f32>,
    pub neighbors: Vec<Vec<u32>>,
}

#[inline]
fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

#[inline]
fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline]
fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(b)
}

/// Serialize a published meta page. Output is exactly `META_PAGE_SIZE` bytes.
pub fn encode_meta(meta: &MetaPage) -> Vec<u8> {
    let c = &meta.config;
    let mut out = Vec::with_capacity(META_PAGE_SIZE);
    out.extend_from_slice(META_MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(c.metric.code());
    out.push(c.heuristic as u8);
    out.extend_from_slice(&(c.dimensions as u32).to_le_bytes());
    out.extend_from_slice(&(c.m as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(c.ef_construction as u32).to_le_bytes());
    out.extend_from_slice(&c.random_seed.to_le_bytes());
    out.extend_from_slice(&meta.entry_point.unwrap_or(NO_ENTRY).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&meta.node_count.to_le_bytes());
    debug_assert_eq!(out.len(), META_BODY_LEN);
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out.resize(META_PAGE_SIZE, 0);
    out
}

/// Parse the meta page. `buf` must hold at least the checksummed body.
pub fn decode_meta(buf: &[u8]) -> Result<MetaPage> {
    if buf.len() < META_BODY_LEN + 4 {
        return Err(HnswError::corrupt(0, "meta page truncated"));
    }
    if buf[..META_BODY_LEN + 4].iter().all(|&b| b == 0) {
        return Err(HnswError::Unpublished);
    }
    if &buf[..8] != META_MAGIC {
        return Err(HnswError::corrupt(0, "bad meta page magic"));
    }
    let stored_crc = u32::from_le_bytes([
        buf[META_BODY_LEN],
        buf[META_BODY_LEN + 1],
        buf[META_BODY_LEN + 2],
        buf[META_BODY_LEN + 3],
    ]);
    let computed_crc = crc32fast::hash(&buf[..META_BODY_LEN]);
    if stored_crc != computed_crc {
        return Err(HnswError::corrupt(
            0,
            format!("meta CRC32 mismatch: expected {stored_crc:#010x}, got {computed_crc:#010x}"),
        ));
    }
    let version = read_u16(buf, 8);
    if version != FORMAT_VERSION {
        return Err(HnswError::corrupt(
            0,
            format!("unsupported format version {version}"),
        ));
    }
    let metric = DistanceMetric::from_code(buf[10])
        .ok_or_else(|| HnswError::corrupt(0, format!("unknown metric code {}", buf[10])))?;
    let entry = read_u32(buf, 32);
    Ok(MetaPage {
        config: HnswConfig {
            dimensions: read_u32(buf, 12) as usize,
            m: read_u16(buf, 16) as usize,
            ef_construction: read_u32(buf, 20) as usize,
            metric,
            random_seed: read_u64(buf, 24),
            heuristic: buf[11] != 0,
        },
        entry_point: (entry != NO_ENTRY).then_some(entry),
        node_count: read_u64(buf, 40),
    })
}

/// Size in bytes of a node page with `layer_count` layers.
pub fn node_page_len(dimensions: usize, m: usize, layer_count: usize) -> usize {
    let lists: usize = (0..layer_count)
        .map(|l| 2 + layer_capacity(m, l) * 4)
        .sum();
    NODE_HEADER_LEN + dimensions * 4 + lists + 4
}

/// Layer count stored in a node page header, after checking the magic.
pub fn peek_layer_count(header: &[u8], offset: u64) -> Result<usize> {
    if header.len() < NODE_HEADER_LEN || read_u32(header, 0) != NODE_MAGIC {
        return Err(HnswError::corrupt(offset, "bad node page magic"));
    }
    let layers = header[16] as usize;
    if layers == 0 {
        return Err(HnswError::corrupt(offset, "node page without layers"));
    }
    Ok(layers)
}

/// Serialize a node page into `out` (cleared first).
///
/// Lists longer than their layer capacity are a caller bug; they are
/// truncated rather than overflowing into the next slot.
pub fn encode_node<L: AsRef<[u32]>>(
    out: &mut Vec<u8>,
    m: usize,
    id: u32,
    tuple: TupleId,
    tombstoned: bool,
    vector: &[f32],
    neighbors: &[L],
) {
    out.clear();
    out.reserve(node_page_len(vector.len(), m, neighbors.len()));
    out.extend_from_slice(&NODE_MAGIC.to_le_bytes());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&tuple.0.to_le_bytes());
    out.push(neighbors.len() as u8);
    out.push(tombstoned as u8);
    out.extend_from_slice(&0u16.to_le_bytes());
    for x in vector {
        out.extend_from_slice(&x.to_le_bytes());
    }
    for (layer, list) in neighbors.iter().enumerate() {
        let cap = layer_capacity(m, layer);
        let list = list.as_ref();
        let len = list.len().min(cap);
        debug_assert!(list.len() <= cap, "neighbor list over capacity");
        out.extend_from_slice(&(len as u16).to_le_bytes());
        for &n in &list[..len] {
            out.extend_from_slice(&n.to_le_bytes());
        }
        for _ in len..cap {
            out.extend_from_slice(&EMPTY_SLOT.to_le_bytes());
        }
    }
    let crc = crc32fast::hash(out);
    out.extend_from_slice(&crc.to_le_bytes());
}

/// Parse a complete node page located at file `offset`.
pub fn decode_node(buf: &[u8], offset: u64, dimensions: usize, m: usize) -> Result<NodePage> {
    let layer_count = peek_layer_count(buf, offset)?;
    let len = node_page_len(dimensions, m, layer_count);
    if buf.len() < len {
        return Err(HnswError::corrupt(offset, "node page truncated"));
    }
    let stored_crc = u32::from_le_bytes([
        buf[len - 4],
        buf[len - 3],
        buf[len - 2],
        buf[len - 1],
    ]);
    let computed_crc = crc32fast::hash(&buf[..len - 4]);
    if stored_crc != computed_crc {
        return Err(HnswError::corrupt(
            offset,
            format!("node CRC32 mismatch: expected {stored_crc:#010x}, got {computed_crc:#010x}"),
        ));
    }

    let mut at = NODE_HEADER_LEN;
    let vector = buf[at..at + dimensions * 4]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    at += dimensions * 4;

    let mut neighbors = Vec::with_capacity(layer_count);
    for layer in 0..layer_count {
        let cap = layer_capacity(m, layer);
        let count = read_u16(buf, at) as usize;
        if count > cap {
            return Err(HnswError::corrupt(
                offset,
                format!("layer {layer} holds {count} neighbors, capacity {cap}"),
            ));
        }
        at += 2;
        neighbors.push((0..count).map(|i| read_u32(buf, at + i * 4)).collect());
        at += cap * 4;
    }

    Ok(NodePage {
        id: read_u32(buf, 4),
        tuple: TupleId(read_u64(buf, 8)),
        tombstoned: buf[17] != 0,
        vector,
        neighbors,
    })
}
