//! MCA region container: a 4 KiB location table, a 4 KiB timestamp table,
//! then sector-aligned compressed chunk payloads.

use crate::error::{MapError, Result};
use crate::vector::Vec2i;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use quartz_nbt::io::Flavor;
use quartz_nbt::NbtCompound;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

pub const SECTOR_SIZE: usize = 4096;
pub const REGION_CHUNKS: usize = 32;
const HEADER_SIZE: usize = 2 * SECTOR_SIZE;
const CHUNK_COUNT: usize = REGION_CHUNKS * REGION_CHUNKS;

// ─── Compression ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompressionType {
    Gzip = 1,
    Zlib = 2,
    Uncompressed = 3,
    Lz4 = 4,
}

impl CompressionType {
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            1 => Ok(CompressionType::Gzip),
            2 => Ok(CompressionType::Zlib),
            3 => Ok(CompressionType::Uncompressed),
            _ => Err(MapError::UnsupportedCompression(b)),
        }
    }
}

pub fn decompress_chunk(data: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    match compression {
        CompressionType::Zlib => {
            let mut decoder = ZlibDecoder::new(data);
            decoder.read_to_end(&mut decompressed)?;
        }
        CompressionType::Gzip => {
            let mut decoder = GzDecoder::new(data);
            decoder.read_to_end(&mut decompressed)?;
        }
        CompressionType::Uncompressed => {
            decompressed = data.to_vec();
        }
        CompressionType::Lz4 => {
            return Err(MapError::UnsupportedCompression(CompressionType::Lz4 as u8));
        }
    }
    Ok(decompressed)
}

// ─── Detection ──────────────────────────────────────────────────────────────

/// Check if data looks like an MCA region file: both header tables present
/// and at least one location entry pointing past them.
pub fn is_mca(data: &[u8]) -> bool {
    if data.len() < HEADER_SIZE {
        return false;
    }
    (0..CHUNK_COUNT).any(|i| {
        let (offset, sectors) = location_entry(data, i);
        offset >= 2 && sectors > 0
    })
}

fn location_entry(data: &[u8], index: usize) -> (u32, u32) {
    let offset = index * 4;
    let loc_offset = ((data[offset] as u32) << 16)
        | ((data[offset + 1] as u32) << 8)
        | (data[offset + 2] as u32);
    (loc_offset, data[offset + 3] as u32)
}

fn read_u32_be(data: &[u8], offset: usize) -> u32 {
    ((data[offset] as u32) << 24)
        | ((data[offset + 1] as u32) << 16)
        | ((data[offset + 2] as u32) << 8)
        | (data[offset + 3] as u32)
}

pub fn chunk_index(local: Vec2i) -> usize {
    (local.x & 31) as usize + (local.y & 31) as usize * REGION_CHUNKS
}

// ─── Read Path ──────────────────────────────────────────────────────────────

/// A region file held in memory. Chunks are decompressed and parsed on demand.
#[derive(Debug, Clone)]
pub struct RegionFile {
    data: Arc<[u8]>,
}

impl RegionFile {
    /// Wraps raw region bytes. An empty file is a valid region without chunks.
    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data = data.into();
        if !data.is_empty() && data.len() < HEADER_SIZE {
            return Err(MapError::Decode(format!(
                "MCA file too small ({} < {} bytes)",
                data.len(),
                HEADER_SIZE
            )));
        }
        Ok(RegionFile { data })
    }

    fn has_header(&self) -> bool {
        self.data.len() >= HEADER_SIZE
    }

    /// Whether the location table has an entry for the chunk at `local`.
    pub fn has_chunk(&self, local: Vec2i) -> bool {
        if !self.has_header() {
            return false;
        }
        let (offset, sectors) = location_entry(&self.data, chunk_index(local));
        offset >= 2 && sectors > 0
    }

    /// Last-modified timestamp (seconds) recorded in the header, 0 if absent.
    pub fn timestamp(&self, local: Vec2i) -> u32 {
        if !self.has_chunk(local) {
            return 0;
        }
        read_u32_be(&self.data, SECTOR_SIZE + chunk_index(local) * 4)
    }

    /// Every chunk slot in use, with its local position and timestamp.
    pub fn chunks(&self) -> impl Iterator<Item = (Vec2i, u32)> + '_ {
        (0..CHUNK_COUNT).filter_map(move |i| {
            let local = Vec2i::new((i % REGION_CHUNKS) as i32, (i / REGION_CHUNKS) as i32);
            self.has_chunk(local).then(|| (local, self.timestamp(local)))
        })
    }

    /// Decompressed NBT bytes of one chunk, or `None` if the slot is empty.
    pub fn read_chunk_bytes(&self, local: Vec2i) -> Result<Option<Vec<u8>>> {
        if !self.has_chunk(local) {
            return Ok(None);
        }
        let data = &self.data;
        let (loc_offset, _) = location_entry(data, chunk_index(local));
        let byte_offset = loc_offset as usize * SECTOR_SIZE;
        if byte_offset + 5 > data.len() {
            return Err(MapError::Decode(format!(
                "chunk {} points past the end of the region file",
                local
            )));
        }

        let chunk_len = read_u32_be(data, byte_offset) as usize;
        if chunk_len <= 1 {
            return Ok(None);
        }
        let compression = CompressionType::from_byte(data[byte_offset + 4])?;

        let compressed_start = byte_offset + 5;
        let compressed_len = chunk_len - 1;
        if compressed_start + compressed_len > data.len() {
            return Err(MapError::Decode(format!(
                "chunk {} payload is truncated ({} bytes declared)",
                local, compressed_len
            )));
        }

        let compressed = &data[compressed_start..compressed_start + compressed_len];
        decompress_chunk(compressed, compression).map(Some)
    }

    /// Parsed NBT root compound of one chunk.
    pub fn read_chunk_nbt(&self, local: Vec2i) -> Result<Option<NbtCompound>> {
        match self.read_chunk_bytes(local)? {
            Some(bytes) => {
                let (nbt, _) =
                    quartz_nbt::io::read_nbt(&mut Cursor::new(&bytes), Flavor::Uncompressed)?;
                Ok(Some(nbt))
            }
            None => Ok(None),
        }
    }
}

// ─── Write Path ─────────────────────────────────────────────────────────────

/// Builds a region file from chunk NBT compounds.
#[derive(Debug, Default)]
pub struct RegionWriter {
    chunks: Vec<(usize, Vec<u8>, u32)>,
}

impl RegionWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the chunk at `local` with the given header timestamp.
    pub fn insert(&mut self, local: Vec2i, nbt: &NbtCompound, timestamp: u32) -> Result<()> {
        let mut nbt_bytes = Vec::new();
        quartz_nbt::io::write_nbt(&mut nbt_bytes, None, nbt, Flavor::Uncompressed)?;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&nbt_bytes)?;
        let compressed = encoder.finish()?;

        let index = chunk_index(local);
        self.chunks.retain(|(i, _, _)| *i != index);
        self.chunks.push((index, compressed, timestamp));
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut parts: Vec<&(usize, Vec<u8>, u32)> = self.chunks.iter().collect();
        // Sort by index for deterministic output
        parts.sort_by_key(|(index, _, _)| *index);

        let mut location_table = vec![0u8; SECTOR_SIZE];
        let mut timestamp_table = vec![0u8; SECTOR_SIZE];
        let mut data_sectors = Vec::new();

        let mut current_sector: u32 = 2; // First two sectors are headers

        for (index, compressed, timestamp) in parts {
            // 4-byte length prefix covers the compression byte plus payload
            let chunk_payload_len = compressed.len() as u32 + 1;
            let total_len = 4 + chunk_payload_len as usize;
            let sector_count = total_len.div_ceil(SECTOR_SIZE);

            let loc_offset = index * 4;
            location_table[loc_offset] = ((current_sector >> 16) & 0xFF) as u8;
            location_table[loc_offset + 1] = ((current_sector >> 8) & 0xFF) as u8;
            location_table[loc_offset + 2] = (current_sector & 0xFF) as u8;
            location_table[loc_offset + 3] = sector_count as u8;
            timestamp_table[loc_offset..loc_offset + 4].copy_from_slice(&timestamp.to_be_bytes());

            let mut chunk_sector = Vec::with_capacity(sector_count * SECTOR_SIZE);
            chunk_sector.extend_from_slice(&chunk_payload_len.to_be_bytes());
            chunk_sector.push(CompressionType::Zlib as u8);
            chunk_sector.extend_from_slice(compressed);
            chunk_sector.resize(sector_count * SECTOR_SIZE, 0);

            data_sectors.extend_from_slice(&chunk_sector);
            current_sector += sector_count as u32;
        }

        let mut result = Vec::with_capacity(HEADER_SIZE + data_sectors.len());
        result.extend_from_slice(&location_table);
        result.extend_from_slice(&timestamp_table);
        result.extend_from_slice(&data_sectors);
        result
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use quartz_nbt::NbtTag;

    fn chunk_nbt(x: i32, z: i32) -> NbtCompound {
        let mut root = NbtCompound::new();
        root.insert("DataVersion", NbtTag::Int(3700));
        root.insert("xPos", NbtTag::Int(x));
        root.insert("zPos", NbtTag::Int(z));
        root.insert("Status", NbtTag::String("minecraft:full".to_string()));
        root
    }

    fn single_chunk_region() -> Vec<u8> {
        let mut writer = RegionWriter::new();
        writer.insert(Vec2i::new(0, 0), &chunk_nbt(0, 0), 1234).unwrap();
        writer.to_bytes()
    }

    #[test]
    fn test_chunk_index_formula() {
        assert_eq!(chunk_index(Vec2i::new(0, 0)), 0);
        assert_eq!(chunk_index(Vec2i::new(1, 0)), 1);
        assert_eq!(chunk_index(Vec2i::new(0, 1)), 32);
        assert_eq!(chunk_index(Vec2i::new(31, 31)), 1023);
        assert_eq!(chunk_index(Vec2i::new(5, 10)), 325);
        // absolute chunk coordinates wrap into the region
        assert_eq!(chunk_index(Vec2i::new(-1, -32)), 31);
    }

    #[test]
    fn test_is_mca_detection() {
        assert!(!is_mca(&[]));
        assert!(!is_mca(&[0; 8191]));
        // Valid header but all-zero location entries = no chunks
        assert!(!is_mca(&[0; 8192]));

        let mut data = vec![0u8; 8192 + 4096];
        data[2] = 2;
        data[3] = 1;
        assert!(is_mca(&data));

        // offset 1 points into the timestamp table
        data[2] = 1;
        assert!(!is_mca(&data));
    }

    #[test]
    fn test_header_layout_and_alignment() {
        let bytes = single_chunk_region();
        assert_eq!(bytes.len() % SECTOR_SIZE, 0);
        assert!(bytes.len() >= HEADER_SIZE + SECTOR_SIZE);

        let (offset, sectors) = location_entry(&bytes, 0);
        assert_eq!(offset, 2);
        assert!(sectors >= 1);
        for i in 1..CHUNK_COUNT {
            assert_eq!(location_entry(&bytes, i), (0, 0), "slot {} should be empty", i);
        }
        assert_eq!(read_u32_be(&bytes, SECTOR_SIZE), 1234);
        assert_eq!(bytes[HEADER_SIZE + 4], 2, "should be zlib (type 2)");
    }

    #[test]
    fn test_multiple_chunks_roundtrip() {
        let mut writer = RegionWriter::new();
        writer.insert(Vec2i::new(0, 0), &chunk_nbt(0, 0), 10).unwrap();
        writer.insert(Vec2i::new(5, 3), &chunk_nbt(5, 3), 20).unwrap();
        writer.insert(Vec2i::new(31, 31), &chunk_nbt(31, 31), 30).unwrap();
        // replacing keeps a single entry
        writer.insert(Vec2i::new(5, 3), &chunk_nbt(5, 3), 25).unwrap();

        let region = RegionFile::from_bytes(writer.to_bytes()).unwrap();
        let listed: Vec<(Vec2i, u32)> = region.chunks().collect();
        assert_eq!(
            listed,
            vec![
                (Vec2i::new(0, 0), 10),
                (Vec2i::new(5, 3), 25),
                (Vec2i::new(31, 31), 30)
            ]
        );

        let nbt = region.read_chunk_nbt(Vec2i::new(5, 3)).unwrap().unwrap();
        assert_eq!(nbt.get::<_, i32>("xPos").unwrap(), 5);
        assert_eq!(nbt.get::<_, i32>("zPos").unwrap(), 3);
        assert!(region.read_chunk_nbt(Vec2i::new(1, 1)).unwrap().is_none());
        assert_eq!(region.timestamp(Vec2i::new(1, 1)), 0);
    }

    #[test]
    fn test_empty_region_has_no_chunks() {
        let region = RegionFile::from_bytes(Vec::<u8>::new()).unwrap();
        assert_eq!(region.chunks().count(), 0);
        assert!(RegionFile::from_bytes(vec![0u8; 100]).is_err());
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let mut bytes = single_chunk_region();
        bytes.truncate(HEADER_SIZE + 16);
        let region = RegionFile::from_bytes(bytes).unwrap();
        assert!(region.read_chunk_bytes(Vec2i::new(0, 0)).is_err());
    }

    #[test]
    fn test_compression_type_values() {
        assert_eq!(CompressionType::from_byte(1).unwrap(), CompressionType::Gzip);
        assert_eq!(CompressionType::from_byte(2).unwrap(), CompressionType::Zlib);
        assert_eq!(
            CompressionType::from_byte(3).unwrap(),
            CompressionType::Uncompressed
        );
        assert!(matches!(
            CompressionType::from_byte(4),
            Err(MapError::UnsupportedCompression(4))
        ));
        assert!(CompressionType::from_byte(9).is_err());
    }
}
