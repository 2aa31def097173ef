//! Incremental hires map renderer for Minecraft worlds.
//!
//! Region files are decoded into [`chunk::Chunk`]s, tiles are rendered into
//! [`hires::ArrayTileModel`]s and written to a [`storage::Storage`]. Per-tile
//! and per-chunk state is persisted so later runs only touch what changed.
//!
//! ```ignore
//! use nucmap::prelude::*;
//!
//! let world = Arc::new(World::new(
//!     Arc::new(DirectoryRegionSource::for_world("saves/world")),
//!     DimensionSettings::overworld(),
//! ));
//! let map = Arc::new(RenderMap::new(settings, world, storage, resources, pool)?);
//! let manager = RenderManager::new(RenderSettings::default());
//! manager.schedule(Arc::new(MapUpdateTask::for_world(map, ForceStrategy::None, None)?));
//! manager.start(4)?;
//! manager.wait_until_idle(Duration::from_secs(3600));
//! ```

pub mod block_state;
pub mod chunk;
pub mod config;
pub mod entity;
pub mod error;
pub mod formats;
pub mod grid;
pub mod hires;
pub mod map;
pub mod mask;
pub mod render;
pub mod state;
pub mod storage;
pub mod util;
pub mod vector;
pub mod world;

pub use block_state::BlockState;
pub use error::{MapError, Result};
pub use map::RenderMap;
pub use vector::{BlockBox, Vec2i, Vec3i};

pub mod prelude {
    pub use crate::config::{DimensionSettings, MapSettings, NucmapConfig, RenderSettings};
    pub use crate::hires::{DefaultResourcePack, ResourcePack, TileModelPool};
    pub use crate::map::RenderMap;
    pub use crate::render::{
        ForceStrategy, MapPurgeTask, MapSaveTask, MapUpdateTask, RenderManager, RenderTask,
        WorldRegionRenderTask,
    };
    pub use crate::storage::{Compression, FileStorage, MemoryStorage, Storage};
    pub use crate::vector::Vec2i;
    pub use crate::world::{DirectoryRegionSource, MemoryRegionSource, World};
    pub use std::sync::Arc;
    pub use std::time::Duration;
}
