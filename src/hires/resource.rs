//! Block appearance lookup and the per-map material registry.

use super::meta::Color;
use crate::block_state::BlockState;
use crate::error::Result;
use crate::storage::Storage;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// How a block looks and how it interacts with its neighbours.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockProperties {
    /// Hides the faces of neighbouring blocks that touch it.
    pub culling: bool,
    /// Blocks light and view completely.
    pub occluding: bool,
    pub color: Color,
    pub material: SmolStr,
}

impl BlockProperties {
    pub fn invisible() -> Self {
        BlockProperties {
            culling: false,
            occluding: false,
            color: Color::TRANSPARENT,
            material: SmolStr::new_inline("minecraft:air"),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.color.a > 0.0
    }
}

pub trait ResourcePack: Send + Sync {
    fn block_properties(&self, state: &BlockState) -> BlockProperties;
    fn entity_material(&self, id: &str) -> SmolStr;
}

/// Flat colors for common blocks; anything unknown gets a stable grey
/// derived from its name.
#[derive(Debug, Clone, Default)]
pub struct DefaultResourcePack;

impl DefaultResourcePack {
    pub fn new() -> Self {
        DefaultResourcePack
    }

    fn known(id: &str) -> Option<(u32, f32)> {
        let entry = match id {
            "stone" | "andesite" | "cobblestone" => (0x7F7F7F, 1.0),
            "deepslate" => (0x4D4D52, 1.0),
            "bedrock" => (0x565656, 1.0),
            "grass_block" => (0x5D9B3A, 1.0),
            "dirt" | "coarse_dirt" => (0x866043, 1.0),
            "sand" => (0xDBD3A0, 1.0),
            "gravel" => (0x857F7E, 1.0),
            "snow" | "snow_block" => (0xF9FEFE, 1.0),
            "water" => (0x3F76E4, 0.6),
            "ice" => (0x91B7FD, 0.8),
            "lava" => (0xCF5B15, 1.0),
            "oak_log" | "spruce_log" | "birch_log" => (0x6B5433, 1.0),
            "oak_planks" => (0xA2824E, 1.0),
            "oak_leaves" | "birch_leaves" | "spruce_leaves" => (0x48B518, 0.9),
            "glass" => (0xC0F5FE, 0.3),
            "tall_grass" | "short_grass" | "grass" => (0x5D9B3A, 0.5),
            _ => return None,
        };
        Some(entry)
    }
}

impl ResourcePack for DefaultResourcePack {
    fn block_properties(&self, state: &BlockState) -> BlockProperties {
        if state.is_air() {
            return BlockProperties::invisible();
        }
        if state.is_missing() {
            return BlockProperties {
                culling: true,
                occluding: true,
                color: Color::from_hex(0xFF00FF, 1.0),
                material: state.name.clone(),
            };
        }
        let (rgb, alpha) = Self::known(state.id()).unwrap_or_else(|| {
            let shade = 0x60 + (name_hash(&state.name) % 0x40) as u32;
            ((shade << 16) | (shade << 8) | shade, 1.0)
        });
        let solid = alpha >= 1.0;
        BlockProperties {
            culling: solid,
            occluding: solid,
            color: Color::from_hex(rgb, alpha),
            material: state.name.clone(),
        }
    }

    fn entity_material(&self, id: &str) -> SmolStr {
        SmolStr::new(format!("entity/{}", id))
    }
}

fn name_hash(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = rustc_hash::FxHasher::default();
    s.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GalleryData {
    names: Vec<SmolStr>,
    #[serde(skip)]
    index: FxHashMap<SmolStr, i32>,
}

/// Interns material names to stable indices for one map.
#[derive(Debug, Default)]
pub struct TextureGallery {
    data: RwLock<GalleryData>,
}

impl TextureGallery {
    pub const STORAGE_KEY: &'static str = "textures.json";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> i32 {
        if let Some(&i) = self.data.read().index.get(name) {
            return i;
        }
        let mut data = self.data.write();
        if let Some(&i) = data.index.get(name) {
            return i;
        }
        let i = data.names.len() as i32;
        let name = SmolStr::new(name);
        data.names.push(name.clone());
        data.index.insert(name, i);
        i
    }

    pub fn name(&self, index: i32) -> Option<SmolStr> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.data.read().names.get(i).cloned())
    }

    pub fn len(&self) -> usize {
        self.data.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        let mut data = self.data.write();
        data.names.clear();
        data.index.clear();
    }

    pub fn save(&self, storage: &dyn Storage, map: &str) -> Result<()> {
        let json = serde_json::to_vec(&*self.data.read())?;
        storage.write_item(map, Self::STORAGE_KEY, &json)
    }

    /// Replaces the registry with the stored one, if any.
    pub fn load(&self, storage: &dyn Storage, map: &str) -> Result<()> {
        let Some(bytes) = storage.read_item(map, Self::STORAGE_KEY)? else {
            return Ok(());
        };
        let mut loaded: GalleryData = serde_json::from_slice(&bytes)?;
        loaded.index = loaded
            .names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i as i32))
            .collect();
        *self.data.write() = loaded;
        Ok(())
    }
}
