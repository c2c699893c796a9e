//! Page store: the id-addressed node arena and its backing index file.
//!
//! Every node lives in a [`NodeSlot`] owned by the store; graph code refers
//! to nodes by `u32` id only. Each slot mirrors one fixed-size node page, so
//! neighbor rewrites and tombstoning rewrite the page in place and never move
//! it. Ids stay stable until [`PageStore::reclaim`], the only renumbering
//! operation.
//!
//! Writes are serialized by one `parking_lot::Mutex` around the file handle.
//! Each neighbor list sits behind its own `RwLock<Arc<[u32]>>` and is replaced
//! whole, so a concurrent reader sees either the old or the new list.

use crate::config::{HNSW_MAX_LAYERS, META_PAGE_SIZE};
use crate::error::{HnswError, Result};
use crate::hnsw::graph::HnswConfig;
use crate::hnsw::node::{layer_capacity, Node, TupleId};
use crate::storage::page::{
    decode_meta, decode_node, encode_meta, encode_node, node_page_len, peek_layer_count,
    MetaPage, NODE_HEADER_LEN,
};
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-memory image of one node page.
#[derive(Debug)]
pub(crate) struct NodeSlot {
    pub(crate) tuple: TupleId,
    pub(crate) vector: Box<[f32]>,
    layers: Box<[RwLock<Arc<[u32]>>]>,
    tombstoned: AtomicBool,
    offset: u64,
}

impl NodeSlot {
    fn new(
        tuple: TupleId,
        vector: Box<[f32]>,
        lists: Vec<Vec<u32>>,
        tombstoned: bool,
        offset: u64,
    ) -> Self {
        Self {
            tuple,
            vector,
            layers: lists
                .into_iter()
                .map(|l| RwLock::new(Arc::from(l)))
                .collect(),
            tombstoned: AtomicBool::new(tombstoned),
            offset,
        }
    }

    /// Number of layers this node exists on (`max_layer + 1`).
    #[inline]
    pub(crate) fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Current neighbor list at `layer`; empty above the node's top layer.
    #[inline]
    pub(crate) fn neighbors(&self, layer: usize) -> Arc<[u32]> {
        match self.layers.get(layer) {
            Some(list) => Arc::clone(&list.read()),
            None => Arc::from(Vec::new()),
        }
    }

    #[inline]
    pub(crate) fn is_tombstoned(&self) -> bool {
        self.tombstoned.load(Ordering::Acquire)
    }

    fn lists(&self) -> Vec<Arc<[u32]>> {
        self.layers.iter().map(|l| Arc::clone(&l.read())).collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct MetaState {
    entry_point: Option<u32>,
    published: bool,
}

/// File handle plus append cursor. `file` is `None` for in-memory stores.
#[derive(Debug)]
struct PageIo {
    file: Option<File>,
    end: u64,
    scratch: Vec<u8>,
}

impl PageIo {
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(bytes)?;
        }
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.sync_data(),
            None => Ok(()),
        }
    }
}

/// Outcome of [`PageStore::reclaim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimOutcome {
    /// Nodes physically removed.
    pub reclaimed: usize,
    /// Entry point after renumbering.
    pub entry_point: Option<u32>,
}

/// Persistent storage for node and meta pages.
#[derive(Debug)]
pub struct PageStore {
    config: HnswConfig,
    path: Option<PathBuf>,
    nodes: RwLock<Vec<Arc<NodeSlot>>>,
    meta: RwLock<MetaState>,
    io: Mutex<PageIo>,
}

impl PageStore {
    /// Create a new, unpublished index file at `path`, replacing any existing file.
    ///
    /// The meta page is written as zeros; the index cannot be opened until
    /// [`create_meta`](Self::create_meta) publishes it.
    pub fn create(path: &Path, config: HnswConfig) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&[0u8; META_PAGE_SIZE])?;
        file.sync_all()?;
        Ok(Self::with_io(config, Some(path.to_path_buf()), Some(file)))
    }

    /// Create a store that keeps pages in memory only.
    pub fn in_memory(config: HnswConfig) -> Self {
        Self::with_io(config, None, None)
    }

    fn with_io(config: HnswConfig, path: Option<PathBuf>, file: Option<File>) -> Self {
        Self {
            config,
            path,
            nodes: RwLock::new(Vec::new()),
            meta: RwLock::new(MetaState {
                entry_point: None,
                published: false,
            }),
            io: Mutex::new(PageIo {
                file,
                end: META_PAGE_SIZE as u64,
                scratch: Vec::new(),
            }),
        }
    }

    /// Open a published index file, verifying every page checksum.
    ///
    /// A torn trailing page left by a crash during append is dropped and any
    /// neighbor reference to it is scrubbed. Corruption inside the published
    /// node range is fatal.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut meta_buf = vec![0u8; META_PAGE_SIZE];
        if file_len < META_PAGE_SIZE as u64 {
            if file_len == 0 {
                return Err(HnswError::Unpublished);
            }
            return Err(HnswError::corrupt(0, "meta page truncated"));
        }
        reader.read_exact(&mut meta_buf)?;
        let meta = decode_meta(&meta_buf)?;
        let config = meta.config.clone();
        let published = meta.node_count;

        let mut pages = Vec::new();
        let mut offset = META_PAGE_SIZE as u64;
        let mut torn = false;
        let mut header = [0u8; NODE_HEADER_LEN];
        loop {
            let within_published = (pages.len() as u64) < published;
            if offset == file_len {
                break;
            }
            if offset + NODE_HEADER_LEN as u64 > file_len {
                torn = true;
                break;
            }
            reader.read_exact(&mut header)?;
            let layers = match peek_layer_count(&header, offset) {
                Ok(l) if l <= HNSW_MAX_LAYERS => l,
                Ok(_) | Err(_) if !within_published => {
                    torn = true;
                    break;
                }
                Ok(l) => {
                    return Err(HnswError::corrupt(offset, format!("node page with {l} layers")))
                }
                Err(e) => return Err(e),
            };
            let len = node_page_len(config.dimensions, config.m, layers);
            if offset + len as u64 > file_len {
                if within_published {
                    return Err(HnswError::corrupt(offset, "node page truncated"));
                }
                torn = true;
                break;
            }
            let mut page = header.to_vec();
            page.resize(len, 0);
            reader.read_exact(&mut page[NODE_HEADER_LEN..])?;
            let node = match decode_node(&page, offset, config.dimensions, config.m) {
                Ok(node) => node,
                Err(_) if !within_published => {
                    torn = true;
                    break;
                }
                Err(e) => return Err(e),
            };
            if node.id as usize != pages.len() {
                return Err(HnswError::corrupt(
                    offset,
                    format!("node page holds id {}, expected {}", node.id, pages.len()),
                ));
            }
            pages.push((offset, node));
            offset += len as u64;
        }

        if (pages.len() as u64) < published {
            return Err(HnswError::corrupt(
                offset,
                format!("meta records {published} nodes, found {}", pages.len()),
            ));
        }

        let count = pages.len();
        let mut scrubbed = Vec::new();
        let mut slots = Vec::with_capacity(count);
        for (page_offset, mut page) in pages {
            let before: usize = page.neighbors.iter().map(Vec::len).sum();
            for list in &mut page.neighbors {
                list.retain(|&n| (n as usize) < count);
            }
            let after: usize = page.neighbors.iter().map(Vec::len).sum();
            if after != before {
                scrubbed.push(page.id);
            }
            slots.push(Arc::new(NodeSlot::new(
                page.tuple,
                page.vector.into_boxed_slice(),
                page.neighbors,
                page.tombstoned,
                page_offset,
            )));
        }

        let mut entry_point = meta.entry_point;
        if let Some(ep) = entry_point {
            if ep as usize >= count {
                return Err(HnswError::corrupt(
                    0,
                    format!("entry point {ep} >= node count {count}"),
                ));
            }
        }
        let adopted = count as u64 - published;
        if adopted > 0 {
            tracing::warn!(
                "Adopting {} node page(s) written after the last meta update in {:?}",
                adopted,
                path
            );
            entry_point = highest_node(&slots).or(entry_point);
        }

        let store = Self::with_io(config, Some(path.to_path_buf()), Some(reader.into_inner()));
        *store.nodes.write() = slots;
        *store.meta.write() = MetaState {
            entry_point,
            published: true,
        };
        {
            let mut io = store.io.lock();
            io.end = offset;
            if torn {
                tracing::warn!(
                    "Dropping torn trailing node page at offset {} in {:?}",
                    offset,
                    path
                );
                if let Some(file) = io.file.as_mut() {
                    file.set_len(offset)?;
                }
            }
        }
        for id in &scrubbed {
            let slot = store.slot(*id)?;
            store.write_slot(&mut store.io.lock(), *id, &slot)?;
        }
        if adopted > 0 || !scrubbed.is_empty() {
            store.write_meta(&mut store.io.lock(), entry_point)?;
        }

        tracing::info!(
            "Opened HNSW index {:?} ({} nodes, dim={}, M={}, metric={})",
            path,
            count,
            store.config.dimensions,
            store.config.m,
            store.config.metric
        );
        Ok(store)
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Backing file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of nodes in the arena, tombstoned ones included.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tombstoned nodes awaiting vacuum.
    pub fn tombstone_count(&self) -> usize {
        self.nodes.read().iter().filter(|s| s.is_tombstoned()).count()
    }

    /// Meta page plus one page per node.
    pub fn page_count(&self) -> usize {
        1 + self.len()
    }

    /// `true` once a meta page has been published.
    pub fn is_published(&self) -> bool {
        self.meta.read().published
    }

    pub fn entry_point(&self) -> Option<u32> {
        self.meta.read().entry_point
    }

    /// Entry point and its top layer, the global maximum.
    pub fn entry(&self) -> Option<(u32, usize)> {
        let ep = self.entry_point()?;
        let slot = self.slot(ep).ok()?;
        Some((ep, slot.layer_count() - 1))
    }

    /// Current meta record.
    pub fn meta(&self) -> MetaPage {
        MetaPage {
            config: self.config.clone(),
            entry_point: self.entry_point(),
            node_count: self.len() as u64,
        }
    }

    #[inline]
    pub(crate) fn slot(&self, id: u32) -> Result<Arc<NodeSlot>> {
        self.nodes
            .read()
            .get(id as usize)
            .cloned()
            .ok_or(HnswError::NodeNotFound(id))
    }

    /// Publish the meta page: config, entry point and node count, fsynced.
    ///
    /// Called once at the end of a build. Until then the file reads as
    /// unpublished.
    pub fn create_meta(&self, entry_point: Option<u32>) -> Result<()> {
        let mut io = self.io.lock();
        self.write_meta(&mut io, entry_point)
    }

    /// Rewrite the published meta page after an insert or vacuum.
    pub fn update_meta(&self, entry_point: Option<u32>) -> Result<()> {
        let mut io = self.io.lock();
        self.write_meta(&mut io, entry_point)
    }

    fn write_meta(&self, io: &mut PageIo, entry_point: Option<u32>) -> Result<()> {
        let page = encode_meta(&MetaPage {
            config: self.config.clone(),
            entry_point,
            node_count: self.len() as u64,
        });
        io.write_at(0, &page)?;
        io.sync()?;
        *self.meta.write() = MetaState {
            entry_point,
            published: true,
        };
        Ok(())
    }

    /// Append a node page and return the new node id.
    pub fn append_node(
        &self,
        tuple: TupleId,
        vector: &[f32],
        neighbors: Vec<Vec<u32>>,
    ) -> Result<u32> {
        if vector.len() != self.config.dimensions {
            return Err(HnswError::DimensionMismatch {
                expected: self.config.dimensions,
                actual: vector.len(),
            });
        }
        debug_assert!(!neighbors.is_empty() && neighbors.len() <= HNSW_MAX_LAYERS);

        let mut io = self.io.lock();
        let id = self.len() as u32;
        for (layer, list) in neighbors.iter().enumerate() {
            debug_assert!(list.len() <= layer_capacity(self.config.m, layer));
            debug_assert!(!list.contains(&id));
        }
        let offset = io.end;
        let mut buf = std::mem::take(&mut io.scratch);
        encode_node(&mut buf, self.config.m, id, tuple, false, vector, &neighbors);
        let written = io.write_at(offset, &buf);
        let len = buf.len() as u64;
        io.scratch = buf;
        written?;
        io.end = offset + len;

        let slot = NodeSlot::new(tuple, vector.into(), neighbors, false, offset);
        self.nodes.write().push(Arc::new(slot));
        Ok(id)
    }

    /// Owned snapshot of node `id`.
    pub fn read_node(&self, id: u32) -> Result<Node> {
        let slot = self.slot(id)?;
        Ok(Node {
            id,
            tuple: slot.tuple,
            vector: slot.vector.to_vec(),
            neighbors: slot.lists().iter().map(|l| l.to_vec()).collect(),
            tombstoned: slot.is_tombstoned(),
        })
    }

    /// Replace the neighbor list of `id` at `layer` and rewrite its page slot.
    pub fn update_neighbors(&self, id: u32, layer: usize, list: &[u32]) -> Result<()> {
        let slot = self.slot(id)?;
        if layer >= slot.layer_count() {
            return Err(HnswError::LayerOutOfRange { id, layer });
        }
        debug_assert!(list.len() <= layer_capacity(self.config.m, layer));
        debug_assert!(!list.contains(&id), "self-reference in neighbor list");

        let mut io = self.io.lock();
        *slot.layers[layer].write() = Arc::from(list);
        self.write_slot(&mut io, id, &slot)
    }

    /// Tombstone `id`. Returns `true` if the node was live.
    pub fn mark_deleted(&self, id: u32) -> Result<bool> {
        let slot = self.slot(id)?;
        let mut io = self.io.lock();
        if slot.tombstoned.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.write_slot(&mut io, id, &slot)?;
        Ok(true)
    }

    /// Flush page writes to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.io.lock().sync()?;
        Ok(())
    }

    fn write_slot(&self, io: &mut PageIo, id: u32, slot: &NodeSlot) -> Result<()> {
        if io.file.is_none() {
            return Ok(());
        }
        let lists = slot.lists();
        let mut buf = std::mem::take(&mut io.scratch);
        encode_node(
            &mut buf,
            self.config.m,
            id,
            slot.tuple,
            slot.is_tombstoned(),
            &slot.vector,
            &lists,
        );
        let written = io.write_at(slot.offset, &buf);
        io.scratch = buf;
        written?;
        Ok(())
    }

    /// Physically remove every tombstoned node and renumber survivors densely.
    ///
    /// Neighbor lists are rewritten through the id remap; a reference to a
    /// reclaimed node is dropped, never carried over. File-backed stores write
    /// a complete new file and atomically rename it over the old one. The
    /// store is only switched over once the rename has succeeded; on error
    /// both the file and the in-memory arena are left as they were.
    /// Requires exclusive access.
    pub fn reclaim(&mut self, entry_point: Option<u32>) -> Result<ReclaimOutcome> {
        let old = self.nodes.get_mut();
        let mut remap: Vec<Option<u32>> = Vec::with_capacity(old.len());
        let mut next = 0u32;
        for slot in old.iter() {
            if slot.is_tombstoned() {
                remap.push(None);
            } else {
                remap.push(Some(next));
                next += 1;
            }
        }
        let map = |id: u32| remap.get(id as usize).copied().flatten();

        let mut offset = META_PAGE_SIZE as u64;
        let mut fresh = Vec::with_capacity(next as usize);
        for slot in old.iter().filter(|s| !s.is_tombstoned()) {
            let lists: Vec<Vec<u32>> = slot
                .lists()
                .iter()
                .map(|l| l.iter().filter_map(|&n| map(n)).collect())
                .collect();
            let len = node_page_len(self.config.dimensions, self.config.m, lists.len()) as u64;
            fresh.push(Arc::new(NodeSlot::new(
                slot.tuple,
                slot.vector.clone(),
                lists,
                false,
                offset,
            )));
            offset += len;
        }
        let reclaimed = old.len() - fresh.len();
        let entry_point = entry_point.and_then(map);

        let file = match self.path.as_deref() {
            Some(path) => Some(self.rewrite_file(path, &fresh, entry_point)?),
            None => None,
        };

        *self.nodes.get_mut() = fresh;
        let io = self.io.get_mut();
        if file.is_some() {
            io.file = file;
        }
        io.end = offset;
        *self.meta.get_mut() = MetaState {
            entry_point,
            published: true,
        };
        Ok(ReclaimOutcome {
            reclaimed,
            entry_point,
        })
    }

    /// Write `nodes` to `<path>.tmp`, fsync, rename over `path`.
    ///
    /// Returns the handle of the renamed file. The temp file is removed if
    /// any step before the rename fails.
    fn rewrite_file(
        &self,
        path: &Path,
        nodes: &[Arc<NodeSlot>],
        entry_point: Option<u32>,
    ) -> Result<File> {
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let written = self.write_pages(&tmp_path, nodes, entry_point).and_then(|file| {
            fs::rename(&tmp_path, path)?;
            Ok(file)
        });
        if written.is_err() && tmp_path.is_file() {
            let _ = fs::remove_file(&tmp_path);
        }
        written
    }

    fn write_pages(
        &self,
        tmp_path: &Path,
        nodes: &[Arc<NodeSlot>],
        entry_point: Option<u32>,
    ) -> Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(tmp_path)?;
        let mut writer = BufWriter::new(&file);
        writer.write_all(&encode_meta(&MetaPage {
            config: self.config.clone(),
            entry_point,
            node_count: nodes.len() as u64,
        }))?;
        let mut buf = Vec::new();
        for (id, slot) in nodes.iter().enumerate() {
            encode_node(
                &mut buf,
                self.config.m,
                id as u32,
                slot.tuple,
                false,
                &slot.vector,
                &slot.lists(),
            );
            writer.write_all(&buf)?;
        }
        writer.flush()?;
        drop(writer);
        file.sync_all()?;
        Ok(file)
    }
}

/// First node with the most layers.
fn highest_node(slots: &[Arc<NodeSlot>]) -> Option<u32> {
    let mut best: Option<(u32, usize)> = None;
    for (id, slot) in slots.iter().enumerate() {
        if slot.is_tombstoned() {
            continue;
        }
        if best.map_or(true, |(_, layers)| slot.layer_count() > layers) {
            best = Some((id as u32, slot.layer_count()));
        }
    }
    best.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> HnswConfig {
        HnswConfig {
            m: 2,
            ..HnswConfig::new(2)
        }
    }

    fn file_store(dir: &TempDir) -> (PathBuf, PageStore) {
        let path = dir.path().join("idx.hnsw");
        let store = PageStore::create(&path, config()).unwrap();
        (path, store)
    }

    #[test]
    fn test_append_and_read_roundtrip() {
        let store = PageStore::in_memory(config());
        let a = store.append_node(TupleId(10), &[1.0, 2.0], vec![vec![]]).unwrap();
        let b = store
            .append_node(TupleId(11), &[3.0, 4.0], vec![vec![a], vec![a]])
            .unwrap();
        assert_eq!((a, b), (0, 1));
        let node = store.read_node(b).unwrap();
        assert_eq!(node.tuple, TupleId(11));
        assert_eq!(node.vector, vec![3.0, 4.0]);
        assert_eq!(node.neighbors, vec![vec![0], vec![0]]);
        assert!(!node.tombstoned);
        assert!(matches!(store.read_node(9), Err(HnswError::NodeNotFound(9))));
    }

    #[test]
    fn test_append_rejects_wrong_dimension() {
        let store = PageStore::in_memory(config());
        let err = store.append_node(TupleId(0), &[1.0], vec![vec![]]).unwrap_err();
        assert!(matches!(err, HnswError::DimensionMismatch { expected: 2, actual: 1 }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_neighbors_replaces_list() {
        let store = PageStore::in_memory(config());
        store.append_node(TupleId(0), &[0.0, 0.0], vec![vec![]]).unwrap();
        store.append_node(TupleId(1), &[1.0, 0.0], vec![vec![0]]).unwrap();
        let held = store.slot(0).unwrap().neighbors(0);
        store.update_neighbors(0, 0, &[1]).unwrap();
        // A reader holding the old list keeps a consistent copy.
        assert!(held.is_empty());
        assert_eq!(store.read_node(0).unwrap().neighbors(0), &[1]);
        assert!(matches!(
            store.update_neighbors(0, 3, &[]),
            Err(HnswError::LayerOutOfRange { id: 0, layer: 3 })
        ));
    }

    #[test]
    fn test_mark_deleted_once() {
        let store = PageStore::in_memory(config());
        store.append_node(TupleId(0), &[0.0, 0.0], vec![vec![]]).unwrap();
        assert!(store.mark_deleted(0).unwrap());
        assert!(!store.mark_deleted(0).unwrap());
        assert_eq!(store.tombstone_count(), 1);
    }

    #[test]
    fn test_unpublished_file_cannot_open() {
        let dir = TempDir::new().unwrap();
        let (path, store) = file_store(&dir);
        store.append_node(TupleId(0), &[0.0, 0.0], vec![vec![]]).unwrap();
        drop(store);
        assert!(matches!(PageStore::open(&path), Err(HnswError::Unpublished)));
    }

    #[test]
    fn test_reopen_reproduces_nodes() {
        let dir = TempDir::new().unwrap();
        let (path, store) = file_store(&dir);
        store.append_node(TupleId(5), &[0.25, -1.5], vec![vec![], vec![]]).unwrap();
        store.append_node(TupleId(6), &[2.0, 3.0], vec![vec![0]]).unwrap();
        store.update_neighbors(0, 0, &[1]).unwrap();
        store.mark_deleted(1).unwrap();
        store.create_meta(Some(0)).unwrap();
        let before: Vec<Node> = (0..2).map(|i| store.read_node(i).unwrap()).collect();
        drop(store);

        let reopened = PageStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.entry(), Some((0, 1)));
        assert_eq!(reopened.config(), &config());
        for (i, node) in before.iter().enumerate() {
            assert_eq!(&reopened.read_node(i as u32).unwrap(), node);
        }
    }

    #[test]
    fn test_corrupt_node_page_is_fatal() {
        let dir = TempDir::new().unwrap();
        let (path, store) = file_store(&dir);
        store.append_node(TupleId(1), &[1.0, 1.0], vec![vec![]]).unwrap();
        store.create_meta(Some(0)).unwrap();
        drop(store);

        let mut bytes = fs::read(&path).unwrap();
        bytes[META_PAGE_SIZE + NODE_HEADER_LEN + 2] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            PageStore::open(&path),
            Err(HnswError::CorruptPage { .. })
        ));
    }

    #[test]
    fn test_torn_trailing_page_is_dropped() {
        let dir = TempDir::new().unwrap();
        let (path, store) = file_store(&dir);
        store.append_node(TupleId(1), &[1.0, 1.0], vec![vec![]]).unwrap();
        store.create_meta(Some(0)).unwrap();
        store.append_node(TupleId(2), &[2.0, 2.0], vec![vec![0]]).unwrap();
        store.update_neighbors(0, 0, &[1]).unwrap();
        drop(store);

        // Cut the second page in half.
        let bytes = fs::read(&path).unwrap();
        let page = node_page_len(2, 2, 1);
        fs::write(&path, &bytes[..META_PAGE_SIZE + page + page / 2]).unwrap();

        let reopened = PageStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.read_node(0).unwrap().neighbors(0).is_empty());
        let id = reopened.append_node(TupleId(3), &[3.0, 3.0], vec![vec![0]]).unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_reclaim_renumbers_and_rewrites() {
        let dir = TempDir::new().unwrap();
        let (path, mut store) = file_store(&dir);
        store.append_node(TupleId(0), &[0.0, 0.0], vec![vec![], vec![]]).unwrap();
        store.append_node(TupleId(1), &[1.0, 0.0], vec![vec![0]]).unwrap();
        store.append_node(TupleId(2), &[2.0, 0.0], vec![vec![1, 0]]).unwrap();
        store.update_neighbors(0, 0, &[1, 2]).unwrap();
        store.create_meta(Some(0)).unwrap();
        store.mark_deleted(1).unwrap();

        let outcome = store.reclaim(Some(0)).unwrap();
        assert_eq!(outcome.reclaimed, 1);
        assert_eq!(outcome.entry_point, Some(0));
        assert_eq!(store.len(), 2);
        let moved = store.read_node(1).unwrap();
        assert_eq!(moved.tuple, TupleId(2));
        assert_eq!(moved.neighbors(0), &[0]);
        assert_eq!(store.read_node(0).unwrap().neighbors(0), &[1]);

        drop(store);
        let reopened = PageStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.read_node(1).unwrap().tuple, TupleId(2));
        assert!(!path.with_extension("hnsw.tmp").exists());
    }

    #[test]
    fn test_failed_reclaim_leaves_store_intact() {
        let dir = TempDir::new().unwrap();
        let (path, mut store) = file_store(&dir);
        store.append_node(TupleId(0), &[0.0, 0.0], vec![vec![1]]).unwrap();
        store.append_node(TupleId(1), &[1.0, 0.0], vec![vec![0, 2]]).unwrap();
        store.append_node(TupleId(2), &[2.0, 0.0], vec![vec![1]]).unwrap();
        store.create_meta(Some(0)).unwrap();
        store.mark_deleted(0).unwrap();
        let before: Vec<Node> = (0..3).map(|i| store.read_node(i).unwrap()).collect();
        let bytes = fs::read(&path).unwrap();

        // A directory squatting on the temp path makes the rewrite fail.
        let tmp_path = dir.path().join("idx.hnsw.tmp");
        fs::create_dir(&tmp_path).unwrap();
        assert!(matches!(store.reclaim(Some(1)), Err(HnswError::Io(_))));

        assert_eq!(store.len(), 3);
        assert_eq!(store.tombstone_count(), 1);
        assert_eq!(store.entry_point(), Some(0));
        for (i, node) in before.iter().enumerate() {
            assert_eq!(&store.read_node(i as u32).unwrap(), node);
        }
        assert_eq!(fs::read(&path).unwrap(), bytes);
        assert!(tmp_path.is_dir());

        // Appends still land after the old pages.
        let id = store.append_node(TupleId(3), &[3.0, 0.0], vec![vec![2]]).unwrap();
        assert_eq!(id, 3);
        store.update_meta(Some(1)).unwrap();

        fs::remove_dir(&tmp_path).unwrap();
        let outcome = store.reclaim(Some(1)).unwrap();
        assert_eq!(outcome.reclaimed, 1);
        assert_eq!(outcome.entry_point, Some(0));
        drop(store);

        let reopened = PageStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.read_node(2).unwrap().tuple, TupleId(3));
        assert_eq!(reopened.read_node(2).unwrap().neighbors(0), &[1]);
    }
}
