//! High-resolution tile geometry: building, pooling and persisting it.

pub mod codec;
pub mod meta;
pub mod model;
pub mod renderer;
pub mod resource;

pub use meta::{Color, TileMeta, TileMetaSink};
pub use model::{ArrayTileModel, TileModelPool};
pub use renderer::{HiresModelRenderer, RenderContext, RenderPass};
pub use resource::{BlockProperties, DefaultResourcePack, ResourcePack, TextureGallery};

use crate::error::{MapError, Result};
use crate::grid::Grid;
use crate::mask::Mask;
use crate::storage::Storage;
use crate::util::WarnOnce;
use crate::vector::Vec2i;
use crate::world::World;
use log::debug;
use std::sync::Arc;

/// Renders, stores and removes the hires tiles of one map.
pub struct HiresModelManager {
    storage: Arc<dyn Storage>,
    map_id: String,
    tile_grid: Grid,
    renderer: HiresModelRenderer,
    pool: Arc<TileModelPool>,
    warnings: WarnOnce,
}

impl std::fmt::Debug for HiresModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiresModelManager")
            .field("map_id", &self.map_id)
            .field("tile_grid", &self.tile_grid)
            .finish()
    }
}

impl HiresModelManager {
    pub const STORAGE_GRID: &'static str = "hires";

    pub fn new(
        storage: Arc<dyn Storage>,
        map_id: impl Into<String>,
        tile_grid: Grid,
        renderer: HiresModelRenderer,
        pool: Arc<TileModelPool>,
    ) -> Self {
        HiresModelManager {
            storage,
            map_id: map_id.into(),
            tile_grid,
            renderer,
            pool,
            warnings: WarnOnce::new(),
        }
    }

    pub fn tile_grid(&self) -> &Grid {
        &self.tile_grid
    }

    /// Inclusive block columns covered by a tile.
    pub fn tile_bounds(&self, tile: Vec2i) -> (Vec2i, Vec2i) {
        (self.tile_grid.cell_min(tile), self.tile_grid.cell_max(tile))
    }

    /// Renders a tile and, when `save` is set, stores its geometry.
    ///
    /// A tile that exceeds the model capacity is stored with the faces that
    /// fit; this is logged once per map.
    pub fn render(
        &self,
        world: &World,
        mask: &Mask,
        tile: Vec2i,
        meta: &mut dyn TileMetaSink,
        save: bool,
    ) -> Result<()> {
        let (min, max) = self.tile_bounds(tile);
        if !save {
            return self.renderer.render(world, mask, min, max, None, meta);
        }

        let mut model = self.pool.claim();
        let result = match self.renderer.render(world, mask, min, max, Some(&mut model), meta) {
            Err(MapError::TooComplex { faces, max }) => {
                self.warnings.warn("too-complex", || {
                    format!(
                        "Tile {} of map '{}' needs more than {} faces ({} requested), \
                         storing it partially. Further tiles like this are not reported.",
                        tile, self.map_id, max, faces
                    )
                });
                Ok(())
            }
            other => other,
        };
        let stored = result.and_then(|()| {
            model.sort();
            let bytes = codec::encode_model(&model)?;
            self.storage
                .write_grid(&self.map_id, Self::STORAGE_GRID, tile, &bytes)
        });
        debug!(
            "Rendered tile {} of map '{}' with {} faces",
            tile,
            self.map_id,
            model.size()
        );
        self.pool.recycle(model);
        stored
    }

    /// Removes a tile's geometry and clears its columns in `meta`.
    pub fn unrender(&self, tile: Vec2i, meta: &mut dyn TileMetaSink) -> Result<()> {
        self.storage
            .delete_grid(&self.map_id, Self::STORAGE_GRID, tile)?;
        let (min, max) = self.tile_bounds(tile);
        for z in min.y..=max.y {
            for x in min.x..=max.x {
                meta.set_column(x, z, Color::TRANSPARENT, 0, 0);
            }
        }
        Ok(())
    }

    pub fn read_model(&self, tile: Vec2i) -> Result<Option<ArrayTileModel>> {
        self.storage
            .read_grid(&self.map_id, Self::STORAGE_GRID, tile)?
            .map(|bytes| codec::decode_model(&bytes))
            .transpose()
    }

    pub fn tile_exists(&self, tile: Vec2i) -> Result<bool> {
        self.storage
            .grid_exists(&self.map_id, Self::STORAGE_GRID, tile)
    }
}
