//! Block-level access to a world backed by region files.

mod source;

pub use source::{
    parse_region_filename, region_filename, DirectoryRegionSource, MemoryRegionSource,
    RegionSource,
};

use crate::block_state::BlockState;
use crate::chunk::{Chunk, ChunkLoader, LightData};
use crate::config::DimensionSettings;
use crate::error::Result;
use crate::formats::anvil::RegionFile;
use crate::grid::{CHUNK_GRID, REGION_GRID};
use crate::util::WarnOnce;
use crate::vector::Vec2i;
use dashmap::DashMap;
use log::{debug, warn};
use std::sync::Arc;

const DEFAULT_CHUNK_CACHE: usize = 4096;

/// Chunk-to-region mapping: 32x32 chunks per region.
fn region_of_chunk(chunk: Vec2i) -> Vec2i {
    Vec2i::new(chunk.x.div_euclid(32), chunk.y.div_euclid(32))
}

/// Cached, thread-safe view of one dimension of a world.
///
/// Regions and decoded chunks are cached in sharded maps, so readers on
/// different regions never contend on a single lock. Invalidation may race
/// with a reader; the reader then keeps its stale `Arc` until it drops it.
pub struct World {
    source: Arc<dyn RegionSource>,
    loader: ChunkLoader,
    warnings: Arc<WarnOnce>,
    regions: DashMap<Vec2i, Arc<RegionFile>>,
    chunks: DashMap<Vec2i, Arc<Chunk>>,
    chunk_cache_limit: usize,
    region_cache_limit: usize,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("dimension", self.loader.dimension())
            .field("cached_regions", &self.regions.len())
            .field("cached_chunks", &self.chunks.len())
            .finish()
    }
}

impl World {
    pub fn new(source: Arc<dyn RegionSource>, dimension: DimensionSettings) -> Self {
        let warnings = Arc::new(WarnOnce::new());
        World {
            source,
            loader: ChunkLoader::new(dimension, Arc::clone(&warnings)),
            warnings,
            regions: DashMap::new(),
            chunks: DashMap::new(),
            chunk_cache_limit: DEFAULT_CHUNK_CACHE,
            region_cache_limit: Self::DEFAULT_REGION_CACHE,
        }
    }

    /// Region files kept in memory before the cache is emptied.
    pub const DEFAULT_REGION_CACHE: usize = 8;

    pub fn with_chunk_cache_limit(mut self, limit: usize) -> Self {
        self.chunk_cache_limit = limit.max(1);
        self
    }

    pub fn with_region_cache_limit(mut self, limit: usize) -> Self {
        self.region_cache_limit = limit.max(1);
        self
    }

    pub fn cached_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn cached_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_region_cached(&self, pos: Vec2i) -> bool {
        self.regions.contains_key(&pos)
    }

    pub fn dimension(&self) -> &DimensionSettings {
        self.loader.dimension()
    }

    pub fn loader(&self) -> &ChunkLoader {
        &self.loader
    }

    pub fn warnings(&self) -> &WarnOnce {
        &self.warnings
    }

    pub fn list_regions(&self) -> Result<Vec<Vec2i>> {
        self.source.list_regions()
    }

    /// A missing region is returned as an empty one.
    pub fn region(&self, pos: Vec2i) -> Result<Arc<RegionFile>> {
        if let Some(region) = self.regions.get(&pos) {
            return Ok(Arc::clone(region.value()));
        }
        let region = match self.source.load_region(pos)? {
            Some(region) => Arc::new(region),
            None => Arc::new(RegionFile::from_bytes(Vec::<u8>::new())?),
        };
        if self.regions.len() >= self.region_cache_limit {
            debug!("Region cache reached {} entries, clearing", self.regions.len());
            self.regions.clear();
        }
        self.regions.insert(pos, Arc::clone(&region));
        Ok(region)
    }

    /// Loads a chunk. Failures are logged and returned as an errored chunk.
    pub fn chunk(&self, pos: Vec2i) -> Arc<Chunk> {
        if let Some(chunk) = self.chunks.get(&pos) {
            return Arc::clone(chunk.value());
        }
        let chunk = Arc::new(self.load_chunk(pos));
        if self.chunks.len() >= self.chunk_cache_limit {
            debug!("Chunk cache reached {} entries, clearing", self.chunks.len());
            self.chunks.clear();
        }
        self.chunks.insert(pos, Arc::clone(&chunk));
        chunk
    }

    fn load_chunk(&self, pos: Vec2i) -> Chunk {
        let region_pos = region_of_chunk(pos);
        let nbt = self
            .region(region_pos)
            .and_then(|region| region.read_chunk_nbt(pos));
        match nbt {
            Ok(Some(nbt)) => match self.loader.load(pos, &nbt) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("Failed to decode chunk {} in region {}: {}", pos, region_pos, e);
                    Chunk::errored(pos)
                }
            },
            Ok(None) => Chunk::empty(pos),
            Err(e) => {
                warn!("Failed to read chunk {} from region {}: {}", pos, region_pos, e);
                Chunk::errored(pos)
            }
        }
    }

    pub fn chunk_at_block(&self, x: i32, z: i32) -> Arc<Chunk> {
        self.chunk(CHUNK_GRID.cell(Vec2i::new(x, z)))
    }

    pub fn block_state_at(&self, x: i32, y: i32, z: i32) -> BlockState {
        self.chunk_at_block(x, z).block_state(x, y, z).clone()
    }

    pub fn light_at(&self, x: i32, y: i32, z: i32) -> LightData {
        self.chunk_at_block(x, z).light(x, y, z)
    }

    /// Change signal for a chunk: its region header timestamp, 0 when absent.
    pub fn chunk_hash(&self, pos: Vec2i) -> Result<i32> {
        let region = self.region(region_of_chunk(pos))?;
        Ok(region.timestamp(pos) as i32)
    }

    /// Chunks stored in a region, with their timestamps, in world chunk coordinates.
    pub fn region_chunks(&self, region: Vec2i) -> Result<Vec<(Vec2i, u32)>> {
        let origin = REGION_GRID.divide(&CHUNK_GRID).cell_min(region);
        Ok(self
            .region(region)?
            .chunks()
            .map(|(local, ts)| (origin + local, ts))
            .collect())
    }

    pub fn invalidate_chunk(&self, pos: Vec2i) {
        self.chunks.remove(&pos);
    }

    /// Drops a region and every cached chunk inside it.
    pub fn invalidate_region(&self, pos: Vec2i) {
        self.regions.remove(&pos);
        self.chunks.retain(|chunk, _| region_of_chunk(*chunk) != pos);
    }

    pub fn invalidate_all(&self) {
        self.regions.clear();
        self.chunks.clear();
    }
}
