use std::io;

/// Error type shared by every fallible operation in the crate.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("NBT error: {0}")]
    Nbt(#[from] quartz_nbt::io::NbtIoError),
    #[error("NBT structure error: {0}")]
    NbtRepr(#[from] quartz_nbt::NbtReprError),
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Unsupported compression type: {0}")]
    UnsupportedCompression(u8),
    #[error("Tile model too complex: {faces} faces requested, maximum is {max}")]
    TooComplex { faces: usize, max: usize },
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MapError>;
