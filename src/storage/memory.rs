use super::{Compression, Storage};
use crate::error::Result;
use crate::vector::Vec2i;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Key {
    Item(String),
    Grid(String, i32, i32),
}

/// In-memory backend, used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    compression: Compression,
    maps: RwLock<BTreeMap<String, BTreeMap<Key, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new(compression: Compression) -> Self {
        MemoryStorage {
            compression,
            maps: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self, map: &str, key: &Key) -> Result<Option<Vec<u8>>> {
        let maps = self.maps.read();
        match maps.get(map).and_then(|m| m.get(key)) {
            Some(data) => Ok(Some(self.compression.decompress(data)?)),
            None => Ok(None),
        }
    }

    fn write(&self, map: &str, key: Key, data: &[u8]) -> Result<()> {
        let data = self.compression.compress(data)?;
        self.maps
            .write()
            .entry(map.to_string())
            .or_default()
            .insert(key, data);
        Ok(())
    }

    fn delete(&self, map: &str, key: &Key) {
        if let Some(entries) = self.maps.write().get_mut(map) {
            entries.remove(key);
        }
    }

    fn exists(&self, map: &str, key: &Key) -> bool {
        self.maps
            .read()
            .get(map)
            .is_some_and(|m| m.contains_key(key))
    }

    /// Number of blobs stored for `map`.
    pub fn len(&self, map: &str) -> usize {
        self.maps.read().get(map).map_or(0, |m| m.len())
    }

    pub fn is_empty(&self, map: &str) -> bool {
        self.len(map) == 0
    }
}

impl Storage for MemoryStorage {
    fn compression(&self) -> Compression {
        self.compression
    }

    fn read_item(&self, map: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.read(map, &Key::Item(key.to_string()))
    }

    fn write_item(&self, map: &str, key: &str, data: &[u8]) -> Result<()> {
        self.write(map, Key::Item(key.to_string()), data)
    }

    fn delete_item(&self, map: &str, key: &str) -> Result<()> {
        self.delete(map, &Key::Item(key.to_string()));
        Ok(())
    }

    fn item_exists(&self, map: &str, key: &str) -> Result<bool> {
        Ok(self.exists(map, &Key::Item(key.to_string())))
    }

    fn read_grid(&self, map: &str, grid: &str, pos: Vec2i) -> Result<Option<Vec<u8>>> {
        self.read(map, &Key::Grid(grid.to_string(), pos.x, pos.y))
    }

    fn write_grid(&self, map: &str, grid: &str, pos: Vec2i, data: &[u8]) -> Result<()> {
        self.write(map, Key::Grid(grid.to_string(), pos.x, pos.y), data)
    }

    fn delete_grid(&self, map: &str, grid: &str, pos: Vec2i) -> Result<()> {
        self.delete(map, &Key::Grid(grid.to_string(), pos.x, pos.y));
        Ok(())
    }

    fn grid_exists(&self, map: &str, grid: &str, pos: Vec2i) -> Result<bool> {
        Ok(self.exists(map, &Key::Grid(grid.to_string(), pos.x, pos.y)))
    }

    fn list_grid(&self, map: &str, grid: &str, start: usize, count: usize) -> Result<Vec<Vec2i>> {
        let maps = self.maps.read();
        let Some(entries) = maps.get(map) else {
            return Ok(Vec::new());
        };
        Ok(entries
            .keys()
            .filter_map(|key| match key {
                Key::Grid(name, x, z) if name == grid => Some(Vec2i::new(*x, *z)),
                _ => None,
            })
            .skip(start)
            .take(count)
            .collect())
    }

    fn list_maps(&self) -> Result<Vec<String>> {
        Ok(self.maps.read().keys().cloned().collect())
    }

    fn purge_map(&self, map: &str, on_progress: &mut dyn FnMut(f64) -> bool) -> Result<bool> {
        let keys: Vec<Key> = match self.maps.read().get(map) {
            Some(entries) => entries.keys().cloned().collect(),
            None => return Ok(true),
        };
        let total = keys.len();
        for (i, key) in keys.iter().enumerate() {
            self.delete(map, key);
            if !on_progress((i + 1) as f64 / total as f64) {
                return Ok(false);
            }
        }
        self.maps.write().remove(map);
        Ok(true)
    }
}
