//! A map: one world dimension rendered into one storage namespace.

use crate::config::MapSettings;
use crate::error::{MapError, Result};
use crate::grid::Grid;
use crate::hires::{
    HiresModelManager, HiresModelRenderer, ResourcePack, TextureGallery, TileMeta, TileModelPool,
};
use crate::mask::{Mask, TriState};
use crate::state::{BoundsSituation, MapChunkState, MapTileState};
use crate::storage::Storage;
use crate::vector::{BlockBox, Vec2i, Vec3i};
use crate::world::World;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Contents of the map's "last saved" item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub saved_at: DateTime<Utc>,
}

pub struct RenderMap {
    settings: MapSettings,
    world: Arc<World>,
    storage: Arc<dyn Storage>,
    mask: Mask,
    tile_grid: Grid,
    chunk_state: MapChunkState,
    tile_state: MapTileState,
    gallery: Arc<TextureGallery>,
    hires: HiresModelManager,
    pending_meta: Mutex<FxHashMap<Vec2i, TileMeta>>,
    last_save: Mutex<Option<Instant>>,
    save_lock: Mutex<()>,
}

impl std::fmt::Debug for RenderMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderMap")
            .field("id", &self.settings.id)
            .field("tile_grid", &self.tile_grid)
            .finish()
    }
}

impl RenderMap {
    pub const LAST_SAVED_KEY: &'static str = "last-saved.json";
    /// Storage grid holding the column metadata of every processed tile.
    pub const TILE_META_GRID: &'static str = "tile-meta";

    pub fn new(
        settings: MapSettings,
        world: Arc<World>,
        storage: Arc<dyn Storage>,
        resources: Arc<dyn ResourcePack>,
        pool: Arc<TileModelPool>,
    ) -> Result<Self> {
        let tile_size = settings.tile_size();
        if tile_size.x <= 0 || tile_size.y <= 0 {
            return Err(MapError::Config(format!(
                "map '{}': tile_size must be positive, got {}",
                settings.id, tile_size
            )));
        }
        let gallery = Arc::new(TextureGallery::new());
        gallery.load(storage.as_ref(), &settings.id)?;
        let tile_grid = Grid::new(tile_size, settings.tile_offset());
        let renderer = HiresModelRenderer::new(resources, Arc::clone(&gallery), settings.render_top_only);
        let hires = HiresModelManager::new(
            Arc::clone(&storage),
            settings.id.clone(),
            tile_grid,
            renderer,
            pool,
        );
        Ok(RenderMap {
            mask: settings.build_mask(),
            chunk_state: MapChunkState::new(Arc::clone(&storage), settings.id.clone()),
            tile_state: MapTileState::new(Arc::clone(&storage), settings.id.clone()),
            settings,
            world,
            storage,
            tile_grid,
            gallery,
            hires,
            pending_meta: Mutex::new(FxHashMap::default()),
            last_save: Mutex::new(None),
            save_lock: Mutex::new(()),
        })
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub fn tile_grid(&self) -> &Grid {
        &self.tile_grid
    }

    pub fn chunk_state(&self) -> &MapChunkState {
        &self.chunk_state
    }

    pub fn tile_state(&self) -> &MapTileState {
        &self.tile_state
    }

    pub fn gallery(&self) -> &TextureGallery {
        &self.gallery
    }

    pub fn hires(&self) -> &HiresModelManager {
        &self.hires
    }

    /// Full-height block box of a tile.
    pub fn tile_box(&self, tile: Vec2i) -> BlockBox {
        let min = self.tile_grid.cell_min(tile);
        let max = self.tile_grid.cell_max(tile);
        let dim = self.world.dimension();
        BlockBox::new(
            Vec3i::new(min.x, dim.min_y, min.y),
            Vec3i::new(max.x, dim.max_y(), max.y),
        )
    }

    /// Where a tile lies against the mask. Edge tiles count as outside
    /// when edges are not rendered.
    pub fn bounds_situation(&self, tile: Vec2i) -> BoundsSituation {
        match self.mask.test_range(&self.tile_box(tile)) {
            TriState::True => BoundsSituation::Inside,
            TriState::False => BoundsSituation::Outside,
            TriState::Undefined if self.settings.render_edges => BoundsSituation::Edge,
            TriState::Undefined => BoundsSituation::Outside,
        }
    }

    fn new_meta(&self, tile: Vec2i) -> TileMeta {
        TileMeta::new(self.tile_grid.cell_min(tile), self.tile_grid.size())
    }

    /// Renders and stores one tile, keeping its column metadata for the
    /// low-res layer.
    pub fn render_tile(&self, tile: Vec2i) -> Result<()> {
        let mut meta = self.new_meta(tile);
        self.hires
            .render(&self.world, &self.mask, tile, &mut meta, true)?;
        self.pending_meta.lock().insert(tile, meta);
        Ok(())
    }

    pub fn unrender_tile(&self, tile: Vec2i) -> Result<()> {
        let mut meta = self.new_meta(tile);
        self.hires.unrender(tile, &mut meta)?;
        self.pending_meta.lock().insert(tile, meta);
        Ok(())
    }

    pub fn pending_meta_count(&self) -> usize {
        self.pending_meta.lock().len()
    }

    /// Hands the collected column metadata to the caller.
    pub fn take_pending_meta(&self) -> FxHashMap<Vec2i, TileMeta> {
        std::mem::take(&mut *self.pending_meta.lock())
    }

    /// Moves the collected column metadata into storage. Every entry is
    /// attempted; the first failure is returned.
    pub fn flush_pending_meta(&self) -> Result<usize> {
        let pending = self.take_pending_meta();
        let count = pending.len();
        let mut first_error = None;
        for (tile, meta) in pending {
            let written = bincode::serialize(&meta)
                .map_err(MapError::from)
                .and_then(|bytes| {
                    self.storage
                        .write_grid(self.id(), Self::TILE_META_GRID, tile, &bytes)
                });
            if let Err(e) = written {
                warn!("Failed to store metadata of tile {} of map '{}': {}", tile, self.id(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Column metadata of a tile, pending or stored.
    pub fn tile_meta(&self, tile: Vec2i) -> Result<Option<TileMeta>> {
        if let Some(meta) = self.pending_meta.lock().get(&tile) {
            return Ok(Some(meta.clone()));
        }
        self.storage
            .read_grid(self.id(), Self::TILE_META_GRID, tile)?
            .map(|bytes| bincode::deserialize(&bytes).map_err(Into::into))
            .transpose()
    }

    pub fn save(&self) -> Result<()> {
        let _saving = self.save_lock.lock();
        self.flush_pending_meta()?;
        self.chunk_state.save()?;
        self.tile_state.save()?;
        self.gallery.save(self.storage.as_ref(), self.id())?;
        let record = SaveRecord {
            saved_at: Utc::now(),
        };
        self.storage.write_item(
            self.id(),
            Self::LAST_SAVED_KEY,
            &serde_json::to_vec(&record)?,
        )?;
        *self.last_save.lock() = Some(Instant::now());
        debug!("Saved map '{}'", self.id());
        Ok(())
    }

    /// Saves unless the previous save is more recent than the save interval.
    pub fn save_rate_limited(&self) -> Result<bool> {
        let interval = Duration::from_secs(self.settings.save_interval_secs);
        let previous = {
            let mut last = self.last_save.lock();
            if matches!(*last, Some(at) if at.elapsed() < interval) {
                return Ok(false);
            }
            last.replace(Instant::now())
        };
        if let Err(e) = self.save() {
            *self.last_save.lock() = previous;
            return Err(e);
        }
        Ok(true)
    }

    pub fn last_saved(&self) -> Result<Option<SaveRecord>> {
        self.storage
            .read_item(self.id(), Self::LAST_SAVED_KEY)?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(Into::into))
            .transpose()
    }

    /// Deletes everything stored for this map and resets its state.
    ///
    /// Returns `false` when `on_progress` stopped the deletion early. The
    /// in-memory state is reset in both cases.
    pub fn purge(&self, on_progress: &mut dyn FnMut(f64) -> bool) -> Result<bool> {
        let _saving = self.save_lock.lock();
        self.pending_meta.lock().clear();
        let result = self.storage.purge_map(self.id(), on_progress);
        self.chunk_state.reset();
        self.tile_state.reset();
        self.gallery.reset();
        *self.last_save.lock() = None;
        let finished = result?;
        if finished {
            info!("Purged map '{}'", self.id());
        } else {
            info!("Purge of map '{}' was cancelled", self.id());
        }
        Ok(finished)
    }
}
