//! Chunk schema generations and version dispatch.

use super::legacy::{legacy_block, DEFAULT_BIOME};
use super::packed::{bits_for, AlignedPackedArray};
use super::{Biomes, BlockStorage, Chunk, ChunkLoadState, PackedLayout, Section, SectionBiomes};
use crate::block_state::{BlockState, MISSING};
use crate::config::DimensionSettings;
use crate::entity::Entity;
use crate::error::{MapError, Result};
use crate::util::WarnOnce;
use crate::vector::Vec2i;
use quartz_nbt::{NbtCompound, NbtList, NbtTag};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// On-disk chunk layouts, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkSchema {
    /// 1.18+: root-level sections with block and biome palettes.
    Modern,
    /// 1.16-1.17: section palettes in the word-aligned packing.
    Aligned,
    /// 1.13-1.15: section palettes in the continuous packing.
    Flattened,
    /// Before 1.13: numeric block ids.
    Legacy,
}

const SCHEMAS: [ChunkSchema; 4] = [
    ChunkSchema::Modern,
    ChunkSchema::Aligned,
    ChunkSchema::Flattened,
    ChunkSchema::Legacy,
];

impl ChunkSchema {
    /// Lowest data version this schema decodes.
    pub fn min_data_version(self) -> i32 {
        match self {
            ChunkSchema::Modern => 2844,
            ChunkSchema::Aligned => 2529,
            ChunkSchema::Flattened => 1451,
            ChunkSchema::Legacy => 0,
        }
    }

    /// Newest schema whose minimum version does not exceed `data_version`.
    pub fn for_data_version(data_version: i32) -> ChunkSchema {
        SCHEMAS
            .into_iter()
            .find(|s| s.min_data_version() <= data_version)
            .unwrap_or(ChunkSchema::Legacy)
    }

    fn index(self) -> usize {
        match self {
            ChunkSchema::Modern => 0,
            ChunkSchema::Aligned => 1,
            ChunkSchema::Flattened => 2,
            ChunkSchema::Legacy => 3,
        }
    }

    pub fn decode(
        self,
        position: Vec2i,
        root: &NbtCompound,
        dimension: &DimensionSettings,
        warnings: &Arc<WarnOnce>,
    ) -> Result<Chunk> {
        let mut chunk = Chunk::empty(position);
        chunk.state = ChunkLoadState::Loaded;
        chunk.schema = Some(self);
        chunk.data_version = read_data_version(root);
        chunk.world_min_y = dimension.min_y;
        chunk.min_section = dimension.min_y >> 4;
        chunk.default_sky_light = dimension.sky_light;
        chunk.warnings = Arc::clone(warnings);

        match self {
            ChunkSchema::Legacy => decode_legacy(&mut chunk, level(root)?),
            ChunkSchema::Flattened => {
                decode_paletted(&mut chunk, level(root)?, PackedLayout::Continuous, dimension)
            }
            ChunkSchema::Aligned => {
                decode_paletted(&mut chunk, level(root)?, PackedLayout::Aligned, dimension)
            }
            ChunkSchema::Modern => decode_modern(&mut chunk, root, dimension),
        }
        Ok(chunk)
    }
}

fn read_data_version(root: &NbtCompound) -> i32 {
    root.get::<_, i32>("DataVersion").unwrap_or(0)
}

fn level(root: &NbtCompound) -> Result<&NbtCompound> {
    root.get::<_, &NbtCompound>("Level")
        .map_err(|e| MapError::Decode(format!("chunk has no Level compound: {}", e)))
}

fn flag(nbt: &NbtCompound, key: &str) -> bool {
    nbt.get::<_, i8>(key).map(|b| b != 0).unwrap_or(false)
}

fn section_y(section: &NbtCompound) -> Option<i32> {
    section
        .get::<_, i8>("Y")
        .map(i32::from)
        .or_else(|_| section.get::<_, i32>("Y"))
        .ok()
}

fn byte_array(nbt: &NbtCompound, key: &str) -> Vec<i8> {
    nbt.get::<_, &[i8]>(key).map(|a| a.to_vec()).unwrap_or_default()
}

fn long_array(nbt: &NbtCompound, key: &str) -> Vec<i64> {
    nbt.get::<_, &[i64]>(key).map(|a| a.to_vec()).unwrap_or_default()
}

fn compounds(list: &NbtList) -> impl Iterator<Item = &NbtCompound> {
    list.iter().filter_map(|tag| match tag {
        NbtTag::Compound(c) => Some(c),
        _ => None,
    })
}

fn strip_namespace(status: &str) -> &str {
    status.strip_prefix("minecraft:").unwrap_or(status)
}

fn status_is_generated(status: &str) -> bool {
    !matches!(strip_namespace(status), "" | "empty")
}

/// Whether lighting has run for a chunk at this generation status.
fn status_has_light(status: &str) -> bool {
    matches!(
        strip_namespace(status),
        "light"
            | "spawn"
            | "heightmaps"
            | "full"
            | "lighted"
            | "mobs_spawned"
            | "finalized"
            | "fullchunk"
            | "postprocessed"
    )
}

fn read_palette(list: &NbtList) -> Vec<BlockState> {
    list.iter()
        .map(|tag| match tag {
            NbtTag::Compound(c) => BlockState::from_nbt(c).unwrap_or_else(|_| MISSING.clone()),
            _ => MISSING.clone(),
        })
        .collect()
}

/// Height map words are only trusted at the exact size for 256 entries.
fn read_heightmap(
    heightmaps: Option<&NbtCompound>,
    key: &str,
    bits: u32,
    layout: PackedLayout,
    offset: i32,
) -> Option<Vec<i32>> {
    let data = heightmaps?.get::<_, &[i64]>(key).ok()?;
    let expected = match layout {
        PackedLayout::Continuous => (256 * bits as usize).div_ceil(64),
        PackedLayout::Aligned => AlignedPackedArray::word_count(bits, 256),
    };
    if data.len() != expected {
        return None;
    }
    Some(
        (0..256)
            .map(|i| layout.get(data, bits, i) as i32 + offset)
            .collect(),
    )
}

/// Places decoded sections into a vector indexed from the lowest section.
fn place_sections(chunk: &mut Chunk, mut sections: Vec<Section>) {
    if sections.is_empty() {
        return;
    }
    sections.sort_by_key(|s| s.y);
    let min = sections[0].y;
    let max = sections[sections.len() - 1].y;
    let mut placed: Vec<Option<Section>> = (min..=max).map(|_| None).collect();
    for section in sections {
        let index = (section.y - min) as usize;
        placed[index] = Some(section);
    }
    chunk.min_section = min;
    chunk.sections = placed;
}

fn decode_legacy(chunk: &mut Chunk, level: &NbtCompound) {
    chunk.generated = flag(level, "TerrainPopulated");
    chunk.has_light = flag(level, "LightPopulated");
    chunk.inhabited_time = level.get::<_, i64>("InhabitedTime").unwrap_or(0);

    let mut sections = Vec::new();
    if let Ok(list) = level.get::<_, &NbtList>("Sections") {
        for nbt in compounds(list) {
            let Some(y) = section_y(nbt) else { continue };
            let blocks = byte_array(nbt, "Blocks");
            let data = byte_array(nbt, "Data");
            let add = byte_array(nbt, "Add");

            let mut palette = Vec::new();
            let mut lookup: FxHashMap<(u16, u8), u16> = FxHashMap::default();
            let mut indices = Vec::with_capacity(blocks.len());
            for (i, &low) in blocks.iter().enumerate() {
                let high = if add.is_empty() {
                    0
                } else {
                    super::nibble(&add, i) as u16
                };
                let id = (high << 8) | low as u8 as u16;
                let meta = if data.is_empty() {
                    0
                } else {
                    super::nibble(&data, i)
                };
                let index = *lookup.entry((id, meta)).or_insert_with(|| {
                    palette.push(legacy_block(id, meta).unwrap_or_else(|| MISSING.clone()));
                    (palette.len() - 1) as u16
                });
                indices.push(index);
            }

            let storage = if indices.is_empty() {
                BlockStorage::Empty
            } else {
                BlockStorage::Indexed { palette, indices }
            };
            sections.push(Section {
                y,
                blocks: storage,
                block_light: byte_array(nbt, "BlockLight"),
                sky_light: byte_array(nbt, "SkyLight"),
                biomes: None,
            });
        }
    }
    place_sections(chunk, sections);

    chunk.biomes = match level.get::<_, &[i8]>("Biomes") {
        Ok(ids) if ids.len() == 256 => {
            Biomes::Column(ids.iter().map(|&b| b as u8 as i32).collect())
        }
        _ => Biomes::None,
    };

    // `HeightMap` here tracks light opacity and sits below glass, plants and
    // torches, so it is not a world surface.
    chunk.world_surface = None;

    if let Ok(entities) = level.get::<_, &NbtList>("Entities") {
        chunk.entities = Entity::list_from_nbt(entities);
    }
}

fn decode_paletted(
    chunk: &mut Chunk,
    level: &NbtCompound,
    layout: PackedLayout,
    dimension: &DimensionSettings,
) {
    let status = level.get::<_, &str>("Status").unwrap_or("");
    chunk.generated = status_is_generated(status);
    chunk.has_light = status_has_light(status) || flag(level, "isLightOn");
    chunk.inhabited_time = level.get::<_, i64>("InhabitedTime").unwrap_or(0);

    let mut sections = Vec::new();
    if let Ok(list) = level.get::<_, &NbtList>("Sections") {
        for nbt in compounds(list) {
            let Some(y) = section_y(nbt) else { continue };
            let blocks = match nbt.get::<_, &NbtList>("Palette") {
                Ok(palette) => {
                    let palette = read_palette(palette);
                    let bits = bits_for(palette.len()).max(4);
                    BlockStorage::Paletted {
                        palette,
                        data: long_array(nbt, "BlockStates"),
                        bits,
                        layout,
                    }
                }
                Err(_) => BlockStorage::Empty,
            };
            sections.push(Section {
                y,
                blocks,
                block_light: byte_array(nbt, "BlockLight"),
                sky_light: byte_array(nbt, "SkyLight"),
                biomes: None,
            });
        }
    }
    place_sections(chunk, sections);

    // 1.13 and 1.14 store one id per column, 1.15+ a 4x4x4 grid
    chunk.biomes = match level.get::<_, &[i32]>("Biomes") {
        Ok(ids) if ids.len() == 256 => Biomes::Column(ids.to_vec()),
        Ok(ids) if ids.len() >= 16 => Biomes::Grid(ids.to_vec()),
        _ => Biomes::None,
    };

    let heightmaps = level.get::<_, &NbtCompound>("Heightmaps").ok();
    let bits = match layout {
        PackedLayout::Continuous => 9,
        PackedLayout::Aligned => bits_for(dimension.height as usize + 1),
    };
    chunk.world_surface = read_heightmap(heightmaps, "WORLD_SURFACE", bits, layout, 0);
    chunk.ocean_floor = read_heightmap(heightmaps, "OCEAN_FLOOR", bits, layout, 0);

    if let Ok(entities) = level.get::<_, &NbtList>("Entities") {
        chunk.entities = Entity::list_from_nbt(entities);
    }
}

fn decode_modern(chunk: &mut Chunk, root: &NbtCompound, dimension: &DimensionSettings) {
    let status = root.get::<_, &str>("Status").unwrap_or("");
    chunk.generated = status_is_generated(status);
    chunk.has_light = status_has_light(status) || flag(root, "isLightOn");
    chunk.inhabited_time = root.get::<_, i64>("InhabitedTime").unwrap_or(0);

    let mut sections = Vec::new();
    if let Ok(list) = root.get::<_, &NbtList>("sections") {
        for nbt in compounds(list) {
            let Some(y) = section_y(nbt) else { continue };
            let blocks = match nbt.get::<_, &NbtCompound>("block_states") {
                Ok(states) => match states.get::<_, &NbtList>("palette") {
                    Ok(palette) => {
                        let palette = read_palette(palette);
                        let bits = bits_for(palette.len()).max(4);
                        BlockStorage::Paletted {
                            palette,
                            data: long_array(states, "data"),
                            bits,
                            layout: PackedLayout::Aligned,
                        }
                    }
                    Err(_) => BlockStorage::Empty,
                },
                Err(_) => BlockStorage::Empty,
            };
            let biomes = nbt.get::<_, &NbtCompound>("biomes").ok().map(|biomes| {
                let palette: Vec<SmolStr> = biomes
                    .get::<_, &NbtList>("palette")
                    .map(|list| {
                        list.iter()
                            .map(|tag| match tag {
                                NbtTag::String(name) => SmolStr::new(name),
                                _ => SmolStr::new_inline(DEFAULT_BIOME),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                SectionBiomes {
                    bits: bits_for(palette.len()),
                    palette,
                    data: long_array(biomes, "data"),
                }
            });
            sections.push(Section {
                y,
                blocks,
                block_light: byte_array(nbt, "BlockLight"),
                sky_light: byte_array(nbt, "SkyLight"),
                biomes,
            });
        }
    }
    place_sections(chunk, sections);
    chunk.biomes = Biomes::Sectioned;

    let heightmaps = root.get::<_, &NbtCompound>("Heightmaps").ok();
    let bits = bits_for(dimension.height as usize + 1);
    chunk.world_surface = read_heightmap(
        heightmaps,
        "WORLD_SURFACE",
        bits,
        PackedLayout::Aligned,
        dimension.min_y,
    );
    chunk.ocean_floor = read_heightmap(
        heightmaps,
        "OCEAN_FLOOR",
        bits,
        PackedLayout::Aligned,
        dimension.min_y,
    );
}

/// Decodes chunk NBT, remembering which schema matched last.
///
/// The cached schema decodes first. When the data version it reads maps to
/// a different schema, the parsed compound is decoded again with that one
/// and the cache moves to it.
#[derive(Debug)]
pub struct ChunkLoader {
    dimension: DimensionSettings,
    warnings: Arc<WarnOnce>,
    last: AtomicUsize,
    redecodes: AtomicUsize,
}

impl ChunkLoader {
    pub fn new(dimension: DimensionSettings, warnings: Arc<WarnOnce>) -> Self {
        ChunkLoader {
            dimension,
            warnings,
            last: AtomicUsize::new(0),
            redecodes: AtomicUsize::new(0),
        }
    }

    pub fn dimension(&self) -> &DimensionSettings {
        &self.dimension
    }

    pub fn cached_schema(&self) -> ChunkSchema {
        SCHEMAS[self.last.load(Ordering::Relaxed) % SCHEMAS.len()]
    }

    /// How often a chunk had to be decoded a second time.
    pub fn redecode_count(&self) -> usize {
        self.redecodes.load(Ordering::Relaxed)
    }

    pub fn load(&self, position: Vec2i, root: &NbtCompound) -> Result<Chunk> {
        let cached = self.cached_schema();
        let data_version = match cached.decode(position, root, &self.dimension, &self.warnings) {
            Ok(chunk) => {
                if ChunkSchema::for_data_version(chunk.data_version()) == cached {
                    return Ok(chunk);
                }
                chunk.data_version()
            }
            Err(_) => read_data_version(root),
        };

        let best = ChunkSchema::for_data_version(data_version);
        self.redecodes.fetch_add(1, Ordering::Relaxed);
        let chunk = best.decode(position, root, &self.dimension, &self.warnings)?;
        self.last.store(best.index(), Ordering::Relaxed);
        Ok(chunk)
    }
}
