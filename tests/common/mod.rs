//! World fixtures shared by the integration tests.
#![allow(dead_code)]

use nucmap::chunk::packed::{bits_for, pack_aligned, pack_continuous, AlignedPackedArray};
use nucmap::config::{DimensionSettings, MapSettings, MaskLayerConfig, MaskShape};
use nucmap::entity::Entity;
use nucmap::formats::anvil::RegionWriter;
use nucmap::hires::{DefaultResourcePack, TileModelPool};
use nucmap::render::RenderTask;
use nucmap::storage::{Compression, MemoryStorage, Storage};
use nucmap::world::{MemoryRegionSource, World};
use nucmap::{BlockState, RenderMap, Vec2i};
use quartz_nbt::{NbtCompound, NbtList, NbtTag};
use std::sync::Arc;
use std::time::Duration;

/// Inclusive vertical run of one block type, the same in every column.
#[derive(Debug, Clone, Copy)]
pub struct Layer {
    pub from: i32,
    pub to: i32,
    pub block: &'static str,
}

pub fn flat_layers() -> Vec<Layer> {
    vec![
        Layer { from: 0, to: 0, block: "bedrock" },
        Layer { from: 1, to: 3, block: "stone" },
        Layer { from: 4, to: 4, block: "dirt" },
        Layer { from: 5, to: 5, block: "grass_block" },
    ]
}

fn block_at(layers: &[Layer], y: i32) -> &'static str {
    layers
        .iter()
        .find(|l| y >= l.from && y <= l.to)
        .map(|l| l.block)
        .unwrap_or("air")
}

fn top_of(layers: &[Layer]) -> i32 {
    layers.iter().map(|l| l.to).max().unwrap_or(-1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Full,
    NotGenerated,
    NoLight,
}

#[derive(Debug, Clone)]
pub struct ChunkSpec {
    pub layers: Vec<Layer>,
    pub status: Status,
    pub inhabited_time: i64,
    pub entities: Vec<Entity>,
    /// Pre-1.13 `HeightMap` tag, written as-is by `legacy()`.
    pub height_map: Option<Vec<i32>>,
}

impl ChunkSpec {
    pub fn flat() -> Self {
        ChunkSpec {
            layers: flat_layers(),
            status: Status::Full,
            inhabited_time: 0,
            entities: Vec::new(),
            height_map: None,
        }
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn with_height_map(mut self, heights: Vec<i32>) -> Self {
        self.height_map = Some(heights);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_inhabited_time(mut self, time: i64) -> Self {
        self.inhabited_time = time;
        self
    }

    fn section_range(&self) -> std::ops::RangeInclusive<i32> {
        let min = self.layers.iter().map(|l| l.from).min().unwrap_or(0);
        (min >> 4)..=(top_of(&self.layers) >> 4)
    }

    /// Palette and per-block indices of one 16x16x16 section.
    fn section_blocks(&self, section_y: i32) -> (Vec<&'static str>, Vec<u32>) {
        let mut palette = vec!["air"];
        let mut values = vec![0u32; 4096];
        for ly in 0..16 {
            let name = block_at(&self.layers, section_y * 16 + ly);
            let index = match palette.iter().position(|p| *p == name) {
                Some(i) => i,
                None => {
                    palette.push(name);
                    palette.len() - 1
                }
            } as u32;
            for i in 0..256 {
                values[(ly as usize) << 8 | i] = index;
            }
        }
        (palette, values)
    }

    fn palette_nbt(palette: &[&str]) -> NbtList {
        NbtList::from(
            palette
                .iter()
                .map(|name| BlockState::new(name).to_nbt())
                .collect::<Vec<_>>(),
        )
    }

    fn light_arrays(section: &mut NbtCompound) {
        section.insert("SkyLight", NbtTag::ByteArray(vec![-1i8; 2048]));
        section.insert("BlockLight", NbtTag::ByteArray(vec![0i8; 2048]));
    }

    fn entities_nbt(&self) -> NbtList {
        NbtList::from(self.entities.iter().map(|e| e.to_nbt()).collect::<Vec<_>>())
    }

    fn status_str(&self) -> &'static str {
        match self.status {
            Status::Full => "minecraft:full",
            Status::NotGenerated => "minecraft:empty",
            Status::NoLight => "minecraft:features",
        }
    }

    /// 1.18+ layout.
    pub fn modern(&self, min_y: i32, height: i32) -> NbtCompound {
        let mut root = NbtCompound::new();
        root.insert("DataVersion", NbtTag::Int(3465));
        root.insert("Status", NbtTag::String(self.status_str().to_string()));
        root.insert("InhabitedTime", NbtTag::Long(self.inhabited_time));

        let mut sections = Vec::new();
        for sy in self.section_range() {
            let (palette, values) = self.section_blocks(sy);
            let mut states = NbtCompound::new();
            if palette.len() > 1 {
                let bits = bits_for(palette.len()).max(4);
                states.insert("data", NbtTag::LongArray(pack_aligned(&values, bits)));
            }
            states.insert("palette", Self::palette_nbt(&palette));

            let mut biomes = NbtCompound::new();
            biomes.insert(
                "palette",
                NbtList::from(vec![NbtTag::String("minecraft:plains".to_string())]),
            );

            let mut section = NbtCompound::new();
            section.insert("Y", NbtTag::Byte(sy as i8));
            section.insert("block_states", states);
            section.insert("biomes", biomes);
            if self.status == Status::Full {
                Self::light_arrays(&mut section);
            }
            sections.push(NbtTag::Compound(section));
        }
        root.insert("sections", NbtList::from(sections));

        let bits = bits_for(height as usize + 1);
        let surface = (top_of(&self.layers) + 1 - min_y) as u32;
        let heights = pack_aligned(&[surface; 256], bits);
        assert_eq!(heights.len(), AlignedPackedArray::word_count(bits, 256));
        let mut heightmaps = NbtCompound::new();
        heightmaps.insert("WORLD_SURFACE", NbtTag::LongArray(heights));
        root.insert("Heightmaps", heightmaps);

        root.insert("entities", self.entities_nbt());
        root
    }

    /// 1.13-1.15 (`aligned == false`) or 1.16-1.17 (`aligned == true`) layout.
    pub fn paletted(&self, aligned: bool) -> NbtCompound {
        let mut level = NbtCompound::new();
        level.insert("Status", NbtTag::String(self.status_str().to_string()));
        level.insert("InhabitedTime", NbtTag::Long(self.inhabited_time));

        let mut sections = Vec::new();
        for sy in self.section_range() {
            let (palette, values) = self.section_blocks(sy);
            let bits = bits_for(palette.len()).max(4);
            let data = if aligned {
                pack_aligned(&values, bits)
            } else {
                pack_continuous(&values, bits)
            };
            let mut section = NbtCompound::new();
            section.insert("Y", NbtTag::Byte(sy as i8));
            section.insert("Palette", Self::palette_nbt(&palette));
            section.insert("BlockStates", NbtTag::LongArray(data));
            if self.status == Status::Full {
                Self::light_arrays(&mut section);
            }
            sections.push(NbtTag::Compound(section));
        }
        level.insert("Sections", NbtList::from(sections));
        let biome_count = if aligned { 1024 } else { 256 };
        level.insert("Biomes", NbtTag::IntArray(vec![1; biome_count]));
        level.insert("Entities", self.entities_nbt());

        let mut root = NbtCompound::new();
        root.insert("DataVersion", NbtTag::Int(if aligned { 2586 } else { 1631 }));
        root.insert("Level", level);
        root
    }

    /// Pre-1.13 layout with numeric block ids.
    pub fn legacy(&self) -> NbtCompound {
        let mut level = NbtCompound::new();
        let generated = self.status != Status::NotGenerated;
        level.insert("TerrainPopulated", NbtTag::Byte(generated as i8));
        level.insert("LightPopulated", NbtTag::Byte((self.status == Status::Full) as i8));
        level.insert("InhabitedTime", NbtTag::Long(self.inhabited_time));

        let mut sections = Vec::new();
        for sy in self.section_range() {
            let mut blocks = vec![0i8; 4096];
            for ly in 0..16 {
                let id = legacy_id(block_at(&self.layers, sy * 16 + ly));
                for i in 0..256 {
                    blocks[(ly as usize) << 8 | i] = id;
                }
            }
            let mut section = NbtCompound::new();
            section.insert("Y", NbtTag::Byte(sy as i8));
            section.insert("Blocks", NbtTag::ByteArray(blocks));
            section.insert("Data", NbtTag::ByteArray(vec![0i8; 2048]));
            if self.status == Status::Full {
                Self::light_arrays(&mut section);
            }
            sections.push(NbtTag::Compound(section));
        }
        level.insert("Sections", NbtList::from(sections));
        level.insert("Biomes", NbtTag::ByteArray(vec![1i8; 256]));
        level.insert("Entities", self.entities_nbt());
        if let Some(heights) = &self.height_map {
            level.insert("HeightMap", NbtTag::IntArray(heights.clone()));
        }

        let mut root = NbtCompound::new();
        root.insert("DataVersion", NbtTag::Int(1343));
        root.insert("Level", level);
        root
    }
}

fn legacy_id(name: &str) -> i8 {
    match name {
        "stone" => 1,
        "grass_block" => 2,
        "dirt" => 3,
        "bedrock" => 7,
        "glass" => 20,
        _ => 0,
    }
}

/// Region bytes holding every chunk `make` returns, with its header timestamp.
pub fn region_bytes(make: impl Fn(Vec2i) -> Option<(NbtCompound, u32)>) -> Vec<u8> {
    let mut writer = RegionWriter::new();
    for z in 0..32 {
        for x in 0..32 {
            let local = Vec2i::new(x, z);
            if let Some((nbt, timestamp)) = make(local) {
                writer.insert(local, &nbt, timestamp).unwrap();
            }
        }
    }
    writer.to_bytes()
}

/// A full flat modern region; `status_of` decides each chunk's status.
pub fn flat_region(status_of: impl Fn(Vec2i) -> Status, timestamp: u32) -> Vec<u8> {
    let dim = DimensionSettings::overworld();
    let flat = |status| ChunkSpec::flat().with_status(status).modern(dim.min_y, dim.height);
    region_bytes(|local| Some((flat(status_of(local)), timestamp)))
}

/// Everything covering blocks `0..=max_x` by `0..=max_z` at full height.
pub fn box_mask(max_x: i32, max_z: i32) -> Vec<MaskLayerConfig> {
    vec![MaskLayerConfig {
        shape: MaskShape::Box {
            min: [0, -10_000, 0],
            max: [max_x, 10_000, max_z],
        },
        subtract: false,
    }]
}

pub struct TestMap {
    pub source: Arc<MemoryRegionSource>,
    pub storage: Arc<dyn Storage>,
    pub pool: Arc<TileModelPool>,
}

impl TestMap {
    pub fn new() -> Self {
        TestMap {
            source: Arc::new(MemoryRegionSource::new()),
            storage: Arc::new(MemoryStorage::new(Compression::None)),
            pool: Arc::new(TileModelPool::new(64, 1_000_000, Duration::from_secs(60))),
        }
    }

    pub fn with_max_faces(max_faces: usize) -> Self {
        TestMap {
            pool: Arc::new(TileModelPool::new(4, max_faces, Duration::from_secs(60))),
            ..TestMap::new()
        }
    }

    /// A fresh map instance over the shared source and storage.
    pub fn open(&self, settings: MapSettings) -> Arc<RenderMap> {
        let world = Arc::new(World::new(self.source.clone(), settings.dimension.clone()));
        Arc::new(
            RenderMap::new(
                settings,
                world,
                Arc::clone(&self.storage),
                Arc::new(DefaultResourcePack::new()),
                Arc::clone(&self.pool),
            )
            .unwrap(),
        )
    }
}

pub fn settings(id: &str) -> MapSettings {
    let mut settings = MapSettings::new(id, "unused");
    settings.render_top_only = true;
    settings
}

/// Runs a task to the end on the calling thread.
pub fn run_to_end(task: &dyn RenderTask) {
    while task.has_more_work() {
        task.do_work().unwrap();
    }
}
