use super::TileInfo;
use crate::error::Result;
use crate::grid::Grid;
use crate::storage::Storage;
use crate::vector::Vec2i;
use dashmap::DashMap;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

const PAGE_SIZE: i32 = 32;

#[derive(Debug)]
struct Page<T> {
    values: Vec<T>,
    dirty: bool,
}

/// Sparse cell values split into fixed-size pages, each persisted as one
/// storage grid entry.
///
/// Pages load lazily on first access. A write holds the page's map shard
/// while it mutates, so it is never lost to a concurrent `reset` or `save`.
pub struct PagedGrid<T> {
    storage: Arc<dyn Storage>,
    map_id: String,
    name: &'static str,
    page_grid: Grid,
    pages: DashMap<Vec2i, Page<T>>,
}

impl<T> std::fmt::Debug for PagedGrid<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedGrid")
            .field("map_id", &self.map_id)
            .field("name", &self.name)
            .field("loaded_pages", &self.pages.len())
            .finish()
    }
}

impl<T> PagedGrid<T>
where
    T: Copy + Default + Serialize + DeserializeOwned,
{
    pub fn new(storage: Arc<dyn Storage>, map_id: impl Into<String>, name: &'static str) -> Self {
        PagedGrid {
            storage,
            map_id: map_id.into(),
            name,
            page_grid: Grid::new(Vec2i::splat(PAGE_SIZE), Vec2i::ZERO),
            pages: DashMap::new(),
        }
    }

    fn page_len(&self) -> usize {
        let size = self.page_grid.size();
        (size.x * size.y) as usize
    }

    fn index(&self, pos: Vec2i) -> usize {
        let local = self.page_grid.local(pos);
        (local.y * self.page_grid.size().x + local.x) as usize
    }

    fn load_page(&self, page: Vec2i) -> Page<T> {
        let empty = || Page {
            values: vec![T::default(); self.page_len()],
            dirty: false,
        };
        match self.storage.read_grid(&self.map_id, self.name, page) {
            Ok(Some(bytes)) => match bincode::deserialize::<Vec<T>>(&bytes) {
                Ok(values) if values.len() == self.page_len() => Page {
                    values,
                    dirty: false,
                },
                Ok(values) => {
                    warn!(
                        "Ignoring {} page {} of map '{}': {} entries instead of {}",
                        self.name,
                        page,
                        self.map_id,
                        values.len(),
                        self.page_len()
                    );
                    empty()
                }
                Err(e) => {
                    warn!(
                        "Ignoring unreadable {} page {} of map '{}': {}",
                        self.name, page, self.map_id, e
                    );
                    empty()
                }
            },
            Ok(None) => empty(),
            Err(e) => {
                warn!(
                    "Failed to load {} page {} of map '{}': {}",
                    self.name, page, self.map_id, e
                );
                empty()
            }
        }
    }

    pub fn get(&self, pos: Vec2i) -> T {
        let page = self.page_grid.cell(pos);
        let index = self.index(pos);
        if let Some(loaded) = self.pages.get(&page) {
            return loaded.values[index];
        }
        self.pages
            .entry(page)
            .or_insert_with(|| self.load_page(page))
            .values[index]
    }

    pub fn set(&self, pos: Vec2i, value: T) {
        let page = self.page_grid.cell(pos);
        let index = self.index(pos);
        let mut entry = self
            .pages
            .entry(page)
            .or_insert_with(|| self.load_page(page));
        entry.values[index] = value;
        entry.dirty = true;
    }

    /// Forgets every loaded page. Stored pages are left to the caller.
    pub fn reset(&self) {
        self.pages.clear();
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.pages.iter().any(|p| p.dirty)
    }

    /// Writes every dirty page. Pages that fail to write stay dirty.
    pub fn save(&self) -> Result<()> {
        let mut pending = Vec::new();
        for mut page in self.pages.iter_mut() {
            if page.dirty {
                let bytes = bincode::serialize(&page.values)?;
                page.dirty = false;
                pending.push((*page.key(), bytes));
            }
        }
        let mut first_error = None;
        for (page, bytes) in pending {
            if let Err(e) = self
                .storage
                .write_grid(&self.map_id, self.name, page, &bytes)
            {
                if let Some(mut entry) = self.pages.get_mut(&page) {
                    entry.dirty = true;
                }
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drops pages without unsaved changes from memory.
    pub fn unload_clean(&self) {
        self.pages.retain(|_, page| page.dirty);
    }
}

/// Last seen change hash per chunk; 0 means never seen.
#[derive(Debug)]
pub struct MapChunkState {
    grid: PagedGrid<i32>,
}

impl MapChunkState {
    pub const STORAGE_GRID: &'static str = "chunk-state";

    pub fn new(storage: Arc<dyn Storage>, map_id: impl Into<String>) -> Self {
        MapChunkState {
            grid: PagedGrid::new(storage, map_id, Self::STORAGE_GRID),
        }
    }

    pub fn get(&self, chunk: Vec2i) -> i32 {
        self.grid.get(chunk)
    }

    pub fn set(&self, chunk: Vec2i, hash: i32) {
        self.grid.set(chunk, hash)
    }

    pub fn reset(&self) {
        self.grid.reset()
    }

    pub fn save(&self) -> Result<()> {
        self.grid.save()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.grid.has_unsaved_changes()
    }
}

/// Render state per tile; tiles never seen are [`TileState::Unknown`](super::TileState::Unknown).
#[derive(Debug)]
pub struct MapTileState {
    grid: PagedGrid<TileInfo>,
}

impl MapTileState {
    pub const STORAGE_GRID: &'static str = "tile-state";

    pub fn new(storage: Arc<dyn Storage>, map_id: impl Into<String>) -> Self {
        MapTileState {
            grid: PagedGrid::new(storage, map_id, Self::STORAGE_GRID),
        }
    }

    pub fn get(&self, tile: Vec2i) -> TileInfo {
        self.grid.get(tile)
    }

    pub fn set(&self, tile: Vec2i, info: TileInfo) {
        self.grid.set(tile, info)
    }

    pub fn reset(&self) {
        self.grid.reset()
    }

    pub fn save(&self) -> Result<()> {
        self.grid.save()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.grid.has_unsaved_changes()
    }
}
