//! Decoded chunk columns and their queries.
//!
//! Every on-disk schema generation decodes into the same [`Chunk`] type.
//! Section data stays packed after decoding; block, biome and light values
//! are unpacked per query.

pub mod legacy;
pub mod packed;
pub mod schema;

use crate::block_state::{BlockState, AIR, MISSING};
use crate::entity::Entity;
use crate::util::WarnOnce;
use crate::vector::Vec2i;
use packed::{AlignedPackedArray, PackedArrayAccess};
use smol_str::SmolStr;
use std::sync::Arc;

pub use schema::{ChunkLoader, ChunkSchema};

/// Sky and block light of a single block, each 0..=15.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightData {
    pub sky: u8,
    pub block: u8,
}

impl LightData {
    pub const fn new(sky: u8, block: u8) -> Self {
        LightData { sky, block }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedLayout {
    /// Values form one bit stream and may straddle words (before 1.16).
    Continuous,
    /// Values never straddle words (1.16 and later).
    Aligned,
}

impl PackedLayout {
    fn get(self, data: &[i64], bits: u32, index: usize) -> u32 {
        match self {
            PackedLayout::Continuous => PackedArrayAccess::new(data, bits).get(index),
            PackedLayout::Aligned => AlignedPackedArray::new(data, bits).get(index),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum BlockStorage {
    Empty,
    Paletted {
        palette: Vec<BlockState>,
        data: Vec<i64>,
        bits: u32,
        layout: PackedLayout,
    },
    /// Unpacked palette indices, used by the pre-flattening schema.
    Indexed {
        palette: Vec<BlockState>,
        indices: Vec<u16>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct SectionBiomes {
    pub palette: Vec<SmolStr>,
    pub data: Vec<i64>,
    pub bits: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct Section {
    pub y: i32,
    pub blocks: BlockStorage,
    pub block_light: Vec<i8>,
    pub sky_light: Vec<i8>,
    pub biomes: Option<SectionBiomes>,
}

#[derive(Debug, Clone)]
pub(crate) enum Biomes {
    None,
    /// 16x16 legacy ids, one per column.
    Column(Vec<i32>),
    /// 4x4x4-block cells of legacy ids, 16 cells per vertical layer.
    Grid(Vec<i32>),
    /// Per-section biome palettes.
    Sectioned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLoadState {
    /// Decoded from stored data.
    Loaded,
    /// No data stored for this position.
    Empty,
    /// Stored data could not be read or decoded.
    Error,
}

fn section_index(x: i32, y: i32, z: i32) -> usize {
    (((y & 15) << 8) | ((z & 15) << 4) | (x & 15)) as usize
}

fn nibble(array: &[i8], index: usize) -> u8 {
    match array.get(index >> 1) {
        Some(&byte) => {
            let byte = byte as u8;
            if index & 1 == 0 {
                byte & 0x0F
            } else {
                byte >> 4
            }
        }
        None => 0,
    }
}

#[derive(Debug)]
pub struct Chunk {
    pub(crate) position: Vec2i,
    pub(crate) state: ChunkLoadState,
    pub(crate) schema: Option<ChunkSchema>,
    pub(crate) data_version: i32,
    pub(crate) generated: bool,
    pub(crate) has_light: bool,
    pub(crate) inhabited_time: i64,
    pub(crate) min_section: i32,
    pub(crate) sections: Vec<Option<Section>>,
    pub(crate) biomes: Biomes,
    pub(crate) world_min_y: i32,
    pub(crate) world_surface: Option<Vec<i32>>,
    pub(crate) ocean_floor: Option<Vec<i32>>,
    pub(crate) entities: Vec<Entity>,
    pub(crate) default_sky_light: u8,
    pub(crate) warnings: Arc<WarnOnce>,
}

impl Chunk {
    fn placeholder(position: Vec2i, state: ChunkLoadState) -> Self {
        Chunk {
            position,
            state,
            schema: None,
            data_version: 0,
            generated: false,
            has_light: false,
            inhabited_time: 0,
            min_section: 0,
            sections: Vec::new(),
            biomes: Biomes::None,
            world_min_y: 0,
            world_surface: None,
            ocean_floor: None,
            entities: Vec::new(),
            default_sky_light: 0,
            warnings: Arc::new(WarnOnce::new()),
        }
    }

    /// A chunk position with nothing stored.
    pub fn empty(position: Vec2i) -> Self {
        Self::placeholder(position, ChunkLoadState::Empty)
    }

    /// A chunk whose stored data failed to load.
    pub fn errored(position: Vec2i) -> Self {
        Self::placeholder(position, ChunkLoadState::Error)
    }

    pub fn position(&self) -> Vec2i {
        self.position
    }

    pub fn load_state(&self) -> ChunkLoadState {
        self.state
    }

    pub fn is_errored(&self) -> bool {
        self.state == ChunkLoadState::Error
    }

    pub fn schema(&self) -> Option<ChunkSchema> {
        self.schema
    }

    pub fn data_version(&self) -> i32 {
        self.data_version
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub fn has_light_data(&self) -> bool {
        self.has_light
    }

    pub fn inhabited_time(&self) -> i64 {
        self.inhabited_time
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Lowest Y covered by a stored section.
    pub fn min_y(&self) -> i32 {
        self.sections
            .iter()
            .flatten()
            .map(|s| s.y * 16)
            .min()
            .unwrap_or(self.world_min_y)
    }

    /// Highest Y covered by a stored section; below `min_y` when there are none.
    pub fn max_y(&self) -> i32 {
        self.sections
            .iter()
            .flatten()
            .map(|s| s.y * 16 + 15)
            .max()
            .unwrap_or(self.world_min_y - 1)
    }

    fn section(&self, y: i32) -> Option<&Section> {
        let index = (y >> 4) - self.min_section;
        if index < 0 {
            return None;
        }
        self.sections.get(index as usize).and_then(|s| s.as_ref())
    }

    /// Block at world coordinates; only the low 4 bits of `x` and `z` are used.
    pub fn block_state(&self, x: i32, y: i32, z: i32) -> &BlockState {
        let Some(section) = self.section(y) else {
            return &AIR;
        };
        let index = section_index(x, y, z);
        let (palette, id) = match &section.blocks {
            BlockStorage::Empty => return &AIR,
            BlockStorage::Paletted {
                palette,
                data,
                bits,
                layout,
            } => {
                match palette.len() {
                    0 => return &AIR,
                    1 => return &palette[0],
                    _ => {}
                }
                (palette, layout.get(data, *bits, index) as usize)
            }
            BlockStorage::Indexed { palette, indices } => {
                (palette, indices.get(index).copied().unwrap_or(0) as usize)
            }
        };
        match palette.get(id) {
            Some(state) => state,
            None => {
                self.warnings.warn(
                    format!("palette:{}:{}", self.position, section.y),
                    || {
                        format!(
                            "Chunk {} section {} references palette index {} but the palette has {} entries",
                            self.position,
                            section.y,
                            id,
                            palette.len()
                        )
                    },
                );
                &MISSING
            }
        }
    }

    pub fn light(&self, x: i32, y: i32, z: i32) -> LightData {
        if !self.has_light {
            return LightData::new(self.default_sky_light, 0);
        }
        let Some(section) = self.section(y) else {
            return LightData::new(self.default_sky_light, 0);
        };
        let index = section_index(x, y, z);
        LightData::new(
            nibble(&section.sky_light, index),
            nibble(&section.block_light, index),
        )
    }

    pub fn biome(&self, x: i32, y: i32, z: i32) -> &str {
        match &self.biomes {
            Biomes::None => legacy::DEFAULT_BIOME,
            Biomes::Column(ids) => {
                let index = ((z & 15) * 16 + (x & 15)) as usize;
                ids.get(index)
                    .map(|id| legacy::legacy_biome(*id))
                    .unwrap_or(legacy::DEFAULT_BIOME)
            }
            Biomes::Grid(ids) => {
                let layers = (ids.len() / 16) as i32;
                if layers == 0 {
                    return legacy::DEFAULT_BIOME;
                }
                let layer = ((y - self.world_min_y) >> 2).clamp(0, layers - 1);
                let index = (layer * 16 + ((z & 15) >> 2) * 4 + ((x & 15) >> 2)) as usize;
                legacy::legacy_biome(ids[index])
            }
            Biomes::Sectioned => {
                let Some(biomes) = self.section(y).and_then(|s| s.biomes.as_ref()) else {
                    return legacy::DEFAULT_BIOME;
                };
                let id = match biomes.palette.len() {
                    0 => return legacy::DEFAULT_BIOME,
                    1 => 0,
                    _ => {
                        let index =
                            (((y & 15) >> 2) << 4 | ((z & 15) >> 2) << 2 | ((x & 15) >> 2)) as usize;
                        AlignedPackedArray::new(&biomes.data, biomes.bits).get(index) as usize
                    }
                };
                biomes
                    .palette
                    .get(id)
                    .map(|s| s.as_str())
                    .unwrap_or(legacy::DEFAULT_BIOME)
            }
        }
    }

    pub fn has_world_surface_heights(&self) -> bool {
        self.world_surface.is_some()
    }

    pub fn has_ocean_floor_heights(&self) -> bool {
        self.ocean_floor.is_some()
    }

    /// Y of the first free block above the surface, or `None` without a trusted heightmap.
    pub fn world_surface_y(&self, x: i32, z: i32) -> Option<i32> {
        self.world_surface
            .as_ref()
            .map(|h| h[((z & 15) * 16 + (x & 15)) as usize])
    }

    pub fn ocean_floor_y(&self, x: i32, z: i32) -> Option<i32> {
        self.ocean_floor
            .as_ref()
            .map(|h| h[((z & 15) * 16 + (x & 15)) as usize])
    }
}
