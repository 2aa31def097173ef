//! Binary tile model format (`NUTM`).
//!
//! ```text
//! Header (12 bytes):
//!   magic:      [u8; 4] = b"NUTM"
//!   version:    u32 LE  = 1
//!   face_count: u32 LE
//!
//! Body, one array after the other, each `face_count * width` entries:
//!   position f32 x9, uv f32 x6, ao f32 x3, color f32 x3,
//!   sunlight u8, blocklight u8, material i32
//! ```
//!
//! Array payloads are the in-memory little-endian representation, written
//! and read back with `bytemuck`.

use super::model::{ArrayTileModel, FI_AO, FI_COLOR, FI_POSITION, FI_UV};
use crate::error::{MapError, Result};
use std::io::{Cursor, Read, Write};

const MAGIC: &[u8; 4] = b"NUTM";
const FORMAT_VERSION: u32 = 1;

fn write_u32(w: &mut impl Write, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32(r: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_array<T: bytemuck::Pod>(r: &mut impl Read, len: usize) -> Result<Vec<T>> {
    let mut buf = vec![0u8; len * std::mem::size_of::<T>()];
    r.read_exact(&mut buf)?;
    Ok(bytemuck::pod_collect_to_vec(&buf))
}

/// Serializes the first `size()` faces of a model.
pub fn encode_model(model: &ArrayTileModel) -> Result<Vec<u8>> {
    let n = model.size();
    let mut out = Vec::with_capacity(12 + n * (21 * 4 + 2 + 4));
    out.extend_from_slice(MAGIC);
    write_u32(&mut out, FORMAT_VERSION)?;
    write_u32(&mut out, n as u32)?;
    out.extend_from_slice(bytemuck::cast_slice(&model.position[..n * FI_POSITION]));
    out.extend_from_slice(bytemuck::cast_slice(&model.uv[..n * FI_UV]));
    out.extend_from_slice(bytemuck::cast_slice(&model.ao[..n * FI_AO]));
    out.extend_from_slice(bytemuck::cast_slice(&model.color[..n * FI_COLOR]));
    out.extend_from_slice(&model.sunlight[..n]);
    out.extend_from_slice(&model.blocklight[..n]);
    out.extend_from_slice(bytemuck::cast_slice(&model.material[..n]));
    Ok(out)
}

pub fn decode_model(data: &[u8]) -> Result<ArrayTileModel> {
    let mut r = Cursor::new(data);
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(MapError::Decode("invalid tile model magic (expected NUTM)".to_string()));
    }
    let version = read_u32(&mut r)?;
    if version != FORMAT_VERSION {
        return Err(MapError::Decode(format!(
            "unsupported tile model version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }
    let n = read_u32(&mut r)? as usize;
    let expected = 12 + n * (21 * 4 + 2 + 4);
    if data.len() != expected {
        return Err(MapError::Decode(format!(
            "tile model of {} faces should be {} bytes, got {}",
            n,
            expected,
            data.len()
        )));
    }

    let mut model = ArrayTileModel::new(n, n);
    model.add(n)?;
    model.position[..n * FI_POSITION].copy_from_slice(&read_array::<f32>(&mut r, n * FI_POSITION)?);
    model.uv[..n * FI_UV].copy_from_slice(&read_array::<f32>(&mut r, n * FI_UV)?);
    model.ao[..n * FI_AO].copy_from_slice(&read_array::<f32>(&mut r, n * FI_AO)?);
    model.color[..n * FI_COLOR].copy_from_slice(&read_array::<f32>(&mut r, n * FI_COLOR)?);
    model.sunlight[..n].copy_from_slice(&read_array::<u8>(&mut r, n)?);
    model.blocklight[..n].copy_from_slice(&read_array::<u8>(&mut r, n)?);
    model.material[..n].copy_from_slice(&read_array::<i32>(&mut r, n)?);
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_encode_decode() {
        let mut model = ArrayTileModel::new(4, 100);
        let f = model.add(2).unwrap();
        model.set_positions(f, [Vec3::ZERO, Vec3::X, Vec3::Z]);
        model.set_positions(f + 1, [Vec3::ONE, Vec3::Y, Vec3::Z]);
        model.set_color(f + 1, [0.1, 0.2, 0.3]);
        model.set_lights(f + 1, 15, 7);
        model.set_material(f, 3);

        let bytes = encode_model(&model).unwrap();
        assert_eq!(&bytes[..4], b"NUTM");
        let back = decode_model(&bytes).unwrap();
        assert_eq!(back.size(), 2);
        assert_eq!(back.positions(1), [Vec3::ONE, Vec3::Y, Vec3::Z]);
        assert_eq!(back.color(1), &[0.1, 0.2, 0.3]);
        assert_eq!((back.sunlight(1), back.blocklight(1)), (15, 7));
        assert_eq!(back.material(0), 3);
    }

    #[test]
    fn test_empty_model() {
        let model = ArrayTileModel::new(0, 10);
        let back = decode_model(&encode_model(&model).unwrap()).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(decode_model(b"NOPE\x01\0\0\0\0\0\0\0").is_err());
        let model = ArrayTileModel::new(1, 10);
        let mut bytes = encode_model(&model).unwrap();
        bytes[4] = 9;
        assert!(decode_model(&bytes).is_err());
        // truncated body
        let mut model = ArrayTileModel::new(1, 10);
        model.add(1).unwrap();
        let bytes = encode_model(&model).unwrap();
        assert!(decode_model(&bytes[..bytes.len() - 1]).is_err());
    }
}
