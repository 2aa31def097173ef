use super::{Compression, Storage};
use crate::error::{MapError, Result};
use crate::vector::Vec2i;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Directory backend.
///
/// Layout: `<root>/<map>/<key><suffix>` for items and
/// `<root>/<map>/<grid>/x<X>/z<Z>.bin<suffix>` for grid cells.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    compression: Compression,
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains("..")
        || name.starts_with('/')
        || name.contains('\\')
    {
        return Err(MapError::Storage(format!("invalid storage key '{}'", name)));
    }
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_optional(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn parse_prefixed(name: &str, prefix: char) -> Option<i32> {
    name.strip_prefix(prefix)?.parse().ok()
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>, compression: Compression) -> Self {
        FileStorage {
            root: root.into(),
            compression,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn item_path(&self, map: &str, key: &str) -> Result<PathBuf> {
        check_name(map)?;
        check_name(key)?;
        Ok(self
            .root
            .join(map)
            .join(format!("{}{}", key, self.compression.file_suffix())))
    }

    fn grid_path(&self, map: &str, grid: &str, pos: Vec2i) -> Result<PathBuf> {
        check_name(map)?;
        check_name(grid)?;
        Ok(self
            .root
            .join(map)
            .join(grid)
            .join(format!("x{}", pos.x))
            .join(format!("z{}.bin{}", pos.y, self.compression.file_suffix())))
    }

    fn read_path(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match read_optional(path)? {
            Some(data) => Ok(Some(self.compression.decompress(&data)?)),
            None => Ok(None),
        }
    }

    /// Writes to a uniquely named sibling temp file first, so readers never
    /// see a partial blob and concurrent writers never share a temp file.
    fn write_path(&self, path: &Path, data: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| MapError::Storage(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(parent)?;
        let data = self.compression.compress(data)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(&data)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn compression(&self) -> Compression {
        self.compression
    }

    fn read_item(&self, map: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.read_path(&self.item_path(map, key)?)
    }

    fn write_item(&self, map: &str, key: &str, data: &[u8]) -> Result<()> {
        self.write_path(&self.item_path(map, key)?, data)
    }

    fn delete_item(&self, map: &str, key: &str) -> Result<()> {
        remove_optional(&self.item_path(map, key)?)
    }

    fn item_exists(&self, map: &str, key: &str) -> Result<bool> {
        Ok(self.item_path(map, key)?.is_file())
    }

    fn read_grid(&self, map: &str, grid: &str, pos: Vec2i) -> Result<Option<Vec<u8>>> {
        self.read_path(&self.grid_path(map, grid, pos)?)
    }

    fn write_grid(&self, map: &str, grid: &str, pos: Vec2i, data: &[u8]) -> Result<()> {
        self.write_path(&self.grid_path(map, grid, pos)?, data)
    }

    fn delete_grid(&self, map: &str, grid: &str, pos: Vec2i) -> Result<()> {
        remove_optional(&self.grid_path(map, grid, pos)?)
    }

    fn grid_exists(&self, map: &str, grid: &str, pos: Vec2i) -> Result<bool> {
        Ok(self.grid_path(map, grid, pos)?.is_file())
    }

    fn list_grid(&self, map: &str, grid: &str, start: usize, count: usize) -> Result<Vec<Vec2i>> {
        check_name(map)?;
        check_name(grid)?;
        let dir = self.root.join(map).join(grid);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let suffix = format!(".bin{}", self.compression.file_suffix());
        let mut cells = Vec::new();
        for column in fs::read_dir(&dir)? {
            let column = column?;
            let Some(x) = column
                .file_name()
                .to_str()
                .and_then(|name| parse_prefixed(name, 'x'))
            else {
                continue;
            };
            for file in fs::read_dir(column.path())? {
                let file = file?;
                let name = file.file_name();
                let Some(z) = name
                    .to_str()
                    .and_then(|name| name.strip_suffix(suffix.as_str()))
                    .and_then(|name| parse_prefixed(name, 'z'))
                else {
                    continue;
                };
                cells.push(Vec2i::new(x, z));
            }
        }
        cells.sort_by_key(|c| (c.x, c.y));
        Ok(cells.into_iter().skip(start).take(count).collect())
    }

    fn list_maps(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut maps = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    maps.push(name.to_string());
                }
            }
        }
        maps.sort();
        Ok(maps)
    }

    fn purge_map(&self, map: &str, on_progress: &mut dyn FnMut(f64) -> bool) -> Result<bool> {
        check_name(map)?;
        let dir = self.root.join(map);
        if !dir.is_dir() {
            return Ok(true);
        }
        let mut files = Vec::new();
        collect_files(&dir, &mut files)?;
        let total = files.len();
        for (i, file) in files.iter().enumerate() {
            remove_optional(file)?;
            if !on_progress((i + 1) as f64 / total as f64) {
                return Ok(false);
            }
        }
        fs::remove_dir_all(&dir)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_grid_layout_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), Compression::Gzip);
        storage.write_grid("world", "tiles", Vec2i::new(-1, 3), b"tile").unwrap();
        storage.write_grid("world", "tiles", Vec2i::new(2, 0), b"tile2").unwrap();

        assert!(dir.path().join("world/tiles/x-1/z3.bin.gz").is_file());
        assert_eq!(
            storage.read_grid("world", "tiles", Vec2i::new(-1, 3)).unwrap().unwrap(),
            b"tile"
        );
        assert_eq!(
            storage.list_grid("world", "tiles", 0, 100).unwrap(),
            vec![Vec2i::new(-1, 3), Vec2i::new(2, 0)]
        );
        assert_eq!(storage.list_grid("world", "tiles", 1, 1).unwrap(), vec![Vec2i::new(2, 0)]);
        assert!(storage.list_grid("world", "missing", 0, 10).unwrap().is_empty());

        storage.delete_grid("world", "tiles", Vec2i::new(-1, 3)).unwrap();
        storage.delete_grid("world", "tiles", Vec2i::new(-1, 3)).unwrap();
        assert!(!storage.grid_exists("world", "tiles", Vec2i::new(-1, 3)).unwrap());
    }

    #[test]
    fn test_items_and_purge() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), Compression::None);
        storage.write_item("world", "last_saved", b"123").unwrap();
        assert_eq!(storage.read_item("world", "last_saved").unwrap().unwrap(), b"123");
        assert!(storage.read_item("world", "nothing").unwrap().is_none());
        assert_eq!(storage.list_maps().unwrap(), vec!["world".to_string()]);

        storage.write_grid("world", "tiles", Vec2i::new(0, 0), b"t").unwrap();
        assert!(storage.purge_map("world", &mut |_| true).unwrap());
        assert!(!dir.path().join("world").exists());
    }

    #[test]
    fn test_concurrent_writes_to_one_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path(), Compression::Gzip));
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let storage = Arc::clone(&storage);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        storage.write_item("world", "last-saved.json", &[i; 64]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = storage.read_item("world", "last-saved.json").unwrap().unwrap();
        assert_eq!(stored.len(), 64);
        assert!(stored.iter().all(|&b| b == stored[0]));
        // only the item itself is left behind
        let names: Vec<_> = fs::read_dir(dir.path().join("world"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), Compression::None);
        assert!(storage.write_item("world", "../outside", b"x").is_err());
        assert!(storage.read_item("", "key").is_err());
    }
}
