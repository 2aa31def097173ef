use crate::error::Result;
use crate::formats::anvil::RegionFile;
use crate::vector::Vec2i;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where region files come from.
pub trait RegionSource: Send + Sync {
    /// Positions of every region that exists.
    fn list_regions(&self) -> Result<Vec<Vec2i>>;

    /// Loads a region; a missing region yields `None`.
    fn load_region(&self, pos: Vec2i) -> Result<Option<RegionFile>>;
}

/// Parses `r.<x>.<z>.mca`.
pub fn parse_region_filename(name: &str) -> Option<Vec2i> {
    let mut parts = name.split('.');
    if parts.next()? != "r" {
        return None;
    }
    let x = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    if parts.next()? != "mca" || parts.next().is_some() {
        return None;
    }
    Some(Vec2i::new(x, z))
}

pub fn region_filename(pos: Vec2i) -> String {
    format!("r.{}.{}.mca", pos.x, pos.y)
}

/// Reads `r.X.Z.mca` files from a world's region directory.
#[derive(Debug, Clone)]
pub struct DirectoryRegionSource {
    dir: PathBuf,
}

impl DirectoryRegionSource {
    /// `dir` is the region directory itself.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectoryRegionSource { dir: dir.into() }
    }

    /// Uses `<world>/region`.
    pub fn for_world(world: impl AsRef<Path>) -> Self {
        Self::new(world.as_ref().join("region"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RegionSource for DirectoryRegionSource {
    fn list_regions(&self) -> Result<Vec<Vec2i>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut regions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(pos) = entry.file_name().to_str().and_then(parse_region_filename) {
                regions.push(pos);
            }
        }
        regions.sort();
        Ok(regions)
    }

    fn load_region(&self, pos: Vec2i) -> Result<Option<RegionFile>> {
        match fs::read(self.dir.join(region_filename(pos))) {
            Ok(data) => RegionFile::from_bytes(data).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Region bytes held in memory.
#[derive(Debug, Default)]
pub struct MemoryRegionSource {
    regions: RwLock<FxHashMap<Vec2i, Arc<[u8]>>>,
}

impl MemoryRegionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pos: Vec2i, data: impl Into<Arc<[u8]>>) {
        self.regions.write().insert(pos, data.into());
    }

    pub fn remove(&self, pos: Vec2i) {
        self.regions.write().remove(&pos);
    }
}

impl RegionSource for MemoryRegionSource {
    fn list_regions(&self) -> Result<Vec<Vec2i>> {
        let mut regions: Vec<Vec2i> = self.regions.read().keys().copied().collect();
        regions.sort();
        Ok(regions)
    }

    fn load_region(&self, pos: Vec2i) -> Result<Option<RegionFile>> {
        match self.regions.read().get(&pos) {
            Some(data) => RegionFile::from_bytes(Arc::clone(data)).map(Some),
            None => Ok(None),
        }
    }
}
