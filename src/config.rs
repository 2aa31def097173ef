//! Typed settings, loaded from JSON.

use crate::error::{MapError, Result};
use crate::mask::{BlurMask, BoxMask, CombinedMask, EllipseMask, Mask, PolygonMask};
use crate::storage::Compression;
use crate::vector::{Vec2i, Vec3i};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Vertical extent and lighting of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionSettings {
    #[serde(default = "default_min_y")]
    pub min_y: i32,
    #[serde(default = "default_height")]
    pub height: i32,
    /// Sky light assumed for chunks without light data.
    #[serde(default = "default_sky_light")]
    pub sky_light: u8,
}

fn default_min_y() -> i32 {
    -64
}
fn default_height() -> i32 {
    384
}
fn default_sky_light() -> u8 {
    15
}

impl DimensionSettings {
    pub fn overworld() -> Self {
        DimensionSettings {
            min_y: -64,
            height: 384,
            sky_light: 15,
        }
    }

    pub fn nether() -> Self {
        DimensionSettings {
            min_y: 0,
            height: 256,
            sky_light: 0,
        }
    }

    pub fn end() -> Self {
        DimensionSettings {
            min_y: 0,
            height: 256,
            sky_light: 0,
        }
    }

    /// Pre-1.18 overworld: 256 blocks starting at 0.
    pub fn legacy_overworld() -> Self {
        DimensionSettings {
            min_y: 0,
            height: 256,
            sky_light: 15,
        }
    }

    pub fn max_y(&self) -> i32 {
        self.min_y + self.height - 1
    }
}

impl Default for DimensionSettings {
    fn default() -> Self {
        Self::overworld()
    }
}

/// Worker pool and progress tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,
    /// Finished tasks kept for display.
    #[serde(default = "default_completed_history")]
    pub completed_history: usize,
    /// Pause after a task fails, in milliseconds.
    #[serde(default = "default_error_cooldown_ms")]
    pub error_cooldown_ms: u64,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// Number of progress samples averaged for the time estimate.
    #[serde(default = "default_progress_window")]
    pub progress_window: usize,
    /// Face capacity of one tile model.
    #[serde(default = "default_max_faces")]
    pub max_faces: usize,
    /// Idle time after which an underused pooled tile model is dropped.
    #[serde(default = "default_pool_shrink_secs")]
    pub pool_shrink_secs: u64,
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
fn default_completed_history() -> usize {
    20
}
fn default_error_cooldown_ms() -> u64 {
    1000
}
fn default_progress_interval_ms() -> u64 {
    1000
}
fn default_progress_window() -> usize {
    30
}
fn default_max_faces() -> usize {
    1_000_000
}
fn default_pool_shrink_secs() -> u64 {
    60
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            thread_count: default_thread_count(),
            completed_history: default_completed_history(),
            error_cooldown_ms: default_error_cooldown_ms(),
            progress_interval_ms: default_progress_interval_ms(),
            progress_window: default_progress_window(),
            max_faces: default_max_faces(),
            pool_shrink_secs: default_pool_shrink_secs(),
        }
    }
}

/// Shape of one render-boundary layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaskShape {
    Box {
        min: [i32; 3],
        max: [i32; 3],
    },
    Ellipse {
        center: [f64; 2],
        radius: [f64; 2],
        #[serde(default = "default_mask_min_y")]
        min_y: i32,
        #[serde(default = "default_mask_max_y")]
        max_y: i32,
    },
    Polygon {
        points: Vec<[f64; 2]>,
        #[serde(default = "default_mask_min_y")]
        min_y: i32,
        #[serde(default = "default_mask_max_y")]
        max_y: i32,
    },
    Blur {
        size: i32,
        inner: Box<MaskShape>,
    },
}

fn default_mask_min_y() -> i32 {
    i32::MIN
}
fn default_mask_max_y() -> i32 {
    i32::MAX
}

impl MaskShape {
    pub fn build(&self) -> Mask {
        match self {
            MaskShape::Box { min, max } => Mask::Box(BoxMask::new(
                Vec3i::new(min[0], min[1], min[2]),
                Vec3i::new(max[0], max[1], max[2]),
            )),
            MaskShape::Ellipse {
                center,
                radius,
                min_y,
                max_y,
            } => Mask::Ellipse(EllipseMask::new(
                (center[0], center[1]),
                (radius[0], radius[1]),
                *min_y,
                *max_y,
            )),
            MaskShape::Polygon {
                points,
                min_y,
                max_y,
            } => Mask::Polygon(PolygonMask::new(
                points.iter().map(|p| (p[0], p[1])).collect(),
                *min_y,
                *max_y,
            )),
            MaskShape::Blur { size, inner } => Mask::Blur(BlurMask::new(inner.build(), *size)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskLayerConfig {
    #[serde(flatten)]
    pub shape: MaskShape,
    /// Removes the shape from the layers below instead of adding it.
    #[serde(default)]
    pub subtract: bool,
}

/// Builds the render boundary; no layers means the whole world.
pub fn build_mask(layers: &[MaskLayerConfig]) -> Mask {
    if layers.is_empty() {
        return Mask::All;
    }
    let mut combined = CombinedMask::new();
    for layer in layers {
        combined.add(layer.shape.build(), !layer.subtract);
    }
    Mask::Combined(combined)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSettings {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// World save directory (contains `region/`).
    pub world: PathBuf,
    #[serde(default)]
    pub dimension: DimensionSettings,
    #[serde(default = "default_tile_size")]
    pub tile_size: [i32; 2],
    #[serde(default)]
    pub tile_offset: [i32; 2],
    #[serde(default)]
    pub min_inhabited_time: i64,
    /// Chunk radius searched for an inhabited chunk.
    #[serde(default)]
    pub inhabited_radius: i32,
    #[serde(default)]
    pub render_top_only: bool,
    #[serde(default)]
    pub ignore_missing_light: bool,
    #[serde(default = "default_true")]
    pub render_edges: bool,
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,
    #[serde(default)]
    pub mask: Vec<MaskLayerConfig>,
}

fn default_tile_size() -> [i32; 2] {
    [32, 32]
}
fn default_true() -> bool {
    true
}
fn default_save_interval_secs() -> u64 {
    60
}

impl MapSettings {
    pub fn new(id: impl Into<String>, world: impl Into<PathBuf>) -> Self {
        let id = id.into();
        MapSettings {
            name: id.clone(),
            id,
            world: world.into(),
            dimension: DimensionSettings::default(),
            tile_size: default_tile_size(),
            tile_offset: [0, 0],
            min_inhabited_time: 0,
            inhabited_radius: 0,
            render_top_only: false,
            ignore_missing_light: false,
            render_edges: true,
            save_interval_secs: default_save_interval_secs(),
            mask: Vec::new(),
        }
    }

    pub fn tile_size(&self) -> Vec2i {
        Vec2i::new(self.tile_size[0], self.tile_size[1])
    }

    pub fn tile_offset(&self) -> Vec2i {
        Vec2i::new(self.tile_offset[0], self.tile_offset[1])
    }

    pub fn build_mask(&self) -> Mask {
        build_mask(&self.mask)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NucmapConfig {
    pub storage_root: PathBuf,
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub maps: Vec<MapSettings>,
}

impl NucmapConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: NucmapConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.render.thread_count == 0 {
            return Err(MapError::Config("thread_count must be at least 1".to_string()));
        }
        for map in &self.maps {
            if map.id.is_empty() {
                return Err(MapError::Config("map id must not be empty".to_string()));
            }
            if map.tile_size[0] <= 0 || map.tile_size[1] <= 0 {
                return Err(MapError::Config(format!(
                    "map '{}': tile_size must be positive, got {:?}",
                    map.id, map.tile_size
                )));
            }
            let dim = &map.dimension;
            if dim.height <= 0 || dim.height % 16 != 0 || dim.min_y % 16 != 0 {
                return Err(MapError::Config(format!(
                    "map '{}': world height {} from {} is not section aligned",
                    map.id, dim.height, dim.min_y
                )));
            }
        }
        let mut ids: Vec<&str> = self.maps.iter().map(|m| m.id.as_str()).collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(MapError::Config(format!("duplicate map id '{}'", pair[0])));
        }
        Ok(())
    }

    pub fn map(&self, id: &str) -> Option<&MapSettings> {
        self.maps.iter().find(|m| m.id == id)
    }
}
