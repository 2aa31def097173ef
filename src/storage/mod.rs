//! Byte-blob storage for tiles, state pages and map metadata.
//!
//! Blobs are addressed either by an item key or by a named grid and a cell
//! position. Callers hand over uncompressed bytes; the backend applies its
//! declared [`Compression`].

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::Result;
use crate::vector::Vec2i;
use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Gzip,
    Deflate,
}

impl Compression {
    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            Compression::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
        }
    }

    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Compression::None => out.extend_from_slice(data),
            Compression::Gzip => {
                GzDecoder::new(data).read_to_end(&mut out)?;
            }
            Compression::Deflate => {
                DeflateDecoder::new(data).read_to_end(&mut out)?;
            }
        }
        Ok(out)
    }

    /// File name suffix used by [`FileStorage`].
    pub fn file_suffix(self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
            Compression::Deflate => ".deflate",
        }
    }
}

/// Storage backend contract. Implementations are shared between worker threads.
pub trait Storage: Send + Sync {
    fn compression(&self) -> Compression;

    fn read_item(&self, map: &str, key: &str) -> Result<Option<Vec<u8>>>;
    fn write_item(&self, map: &str, key: &str, data: &[u8]) -> Result<()>;
    fn delete_item(&self, map: &str, key: &str) -> Result<()>;
    fn item_exists(&self, map: &str, key: &str) -> Result<bool>;

    fn read_grid(&self, map: &str, grid: &str, pos: Vec2i) -> Result<Option<Vec<u8>>>;
    fn write_grid(&self, map: &str, grid: &str, pos: Vec2i, data: &[u8]) -> Result<()>;
    fn delete_grid(&self, map: &str, grid: &str, pos: Vec2i) -> Result<()>;
    fn grid_exists(&self, map: &str, grid: &str, pos: Vec2i) -> Result<bool>;

    /// Cells stored in a grid, in a stable order, skipping `start` and returning at most `count`.
    fn list_grid(&self, map: &str, grid: &str, start: usize, count: usize) -> Result<Vec<Vec2i>>;

    fn list_maps(&self) -> Result<Vec<String>>;

    /// Deletes everything stored for `map`. `on_progress` receives the
    /// completed fraction and returns `false` to stop early; the return
    /// value tells whether the purge ran to the end.
    fn purge_map(&self, map: &str, on_progress: &mut dyn FnMut(f64) -> bool) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codecs_roundtrip() {
        let data: Vec<u8> = (0..2000u32).map(|i| (i % 7) as u8).collect();
        for codec in [Compression::None, Compression::Gzip, Compression::Deflate] {
            let packed = codec.compress(&data).unwrap();
            assert_eq!(codec.decompress(&packed).unwrap(), data);
        }
        assert!(Compression::Gzip.compress(&data).unwrap().len() < data.len());
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(Compression::Gzip.decompress(b"not gzip").is_err());
    }
}
