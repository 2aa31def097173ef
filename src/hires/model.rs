//! Growable per-face geometry buffer and its pool.

use crate::error::{MapError, Result};
use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

pub const FI_POSITION: usize = 9;
pub const FI_UV: usize = 6;
pub const FI_AO: usize = 3;
pub const FI_COLOR: usize = 3;

/// Triangle faces stored as parallel arrays, one slot per face.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayTileModel {
    size: usize,
    capacity: usize,
    max_faces: usize,
    high_water: usize,
    underused_since: Option<Instant>,

    pub(crate) position: Vec<f32>,
    pub(crate) uv: Vec<f32>,
    pub(crate) ao: Vec<f32>,
    pub(crate) color: Vec<f32>,
    pub(crate) sunlight: Vec<u8>,
    pub(crate) blocklight: Vec<u8>,
    pub(crate) material: Vec<i32>,
}

impl ArrayTileModel {
    pub fn new(initial_capacity: usize, max_faces: usize) -> Self {
        let mut model = ArrayTileModel {
            size: 0,
            capacity: 0,
            max_faces,
            high_water: 0,
            underused_since: None,
            position: Vec::new(),
            uv: Vec::new(),
            ao: Vec::new(),
            color: Vec::new(),
            sunlight: Vec::new(),
            blocklight: Vec::new(),
            material: Vec::new(),
        };
        model.set_capacity(initial_capacity.min(max_faces));
        model
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_faces(&self) -> usize {
        self.max_faces
    }

    /// Largest size reached since the last [`clear`](Self::clear).
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    fn set_capacity(&mut self, capacity: usize) {
        self.position.resize(capacity * FI_POSITION, 0.0);
        self.uv.resize(capacity * FI_UV, 0.0);
        self.ao.resize(capacity * FI_AO, 0.0);
        self.color.resize(capacity * FI_COLOR, 0.0);
        self.sunlight.resize(capacity, 0);
        self.blocklight.resize(capacity, 0);
        self.material.resize(capacity, 0);
        self.capacity = capacity;
    }

    /// Reserves `count` more faces and returns the index of the first one.
    pub fn add(&mut self, count: usize) -> Result<usize> {
        let start = self.size;
        let required = start + count;
        if required > self.max_faces {
            return Err(MapError::TooComplex {
                faces: required,
                max: self.max_faces,
            });
        }
        if required > self.capacity {
            let grown = (self.capacity * 3 / 2 + count).clamp(required, self.max_faces);
            self.set_capacity(grown);
        }
        self.size = required;
        self.high_water = self.high_water.max(required);
        Ok(start)
    }

    /// Drops all faces; capacity is kept.
    pub fn clear(&mut self) {
        self.size = 0;
        self.high_water = 0;
    }

    pub fn set_positions(&mut self, face: usize, corners: [Vec3; 3]) {
        let p = &mut self.position[face * FI_POSITION..(face + 1) * FI_POSITION];
        for (i, c) in corners.iter().enumerate() {
            p[i * 3] = c.x;
            p[i * 3 + 1] = c.y;
            p[i * 3 + 2] = c.z;
        }
    }

    pub fn positions(&self, face: usize) -> [Vec3; 3] {
        let p = &self.position[face * FI_POSITION..(face + 1) * FI_POSITION];
        [
            Vec3::new(p[0], p[1], p[2]),
            Vec3::new(p[3], p[4], p[5]),
            Vec3::new(p[6], p[7], p[8]),
        ]
    }

    pub fn set_uvs(&mut self, face: usize, uvs: [f32; FI_UV]) {
        self.uv[face * FI_UV..(face + 1) * FI_UV].copy_from_slice(&uvs);
    }

    pub fn uvs(&self, face: usize) -> &[f32] {
        &self.uv[face * FI_UV..(face + 1) * FI_UV]
    }

    pub fn set_ao(&mut self, face: usize, ao: [f32; FI_AO]) {
        self.ao[face * FI_AO..(face + 1) * FI_AO].copy_from_slice(&ao);
    }

    pub fn ao(&self, face: usize) -> &[f32] {
        &self.ao[face * FI_AO..(face + 1) * FI_AO]
    }

    pub fn set_color(&mut self, face: usize, rgb: [f32; FI_COLOR]) {
        self.color[face * FI_COLOR..(face + 1) * FI_COLOR].copy_from_slice(&rgb);
    }

    pub fn color(&self, face: usize) -> &[f32] {
        &self.color[face * FI_COLOR..(face + 1) * FI_COLOR]
    }

    pub fn set_lights(&mut self, face: usize, sky: u8, block: u8) {
        self.sunlight[face] = sky;
        self.blocklight[face] = block;
    }

    pub fn sunlight(&self, face: usize) -> u8 {
        self.sunlight[face]
    }

    pub fn blocklight(&self, face: usize) -> u8 {
        self.blocklight[face]
    }

    pub fn set_material(&mut self, face: usize, material: i32) {
        self.material[face] = material;
    }

    pub fn material(&self, face: usize) -> i32 {
        self.material[face]
    }

    fn for_each_vertex(&mut self, start: usize, count: usize, mut f: impl FnMut(Vec3) -> Vec3) {
        let end = (start + count).min(self.size);
        for v in &mut self.position[start * FI_POSITION..end * FI_POSITION].chunks_exact_mut(3) {
            let out = f(Vec3::new(v[0], v[1], v[2]));
            v[0] = out.x;
            v[1] = out.y;
            v[2] = out.z;
        }
    }

    pub fn translate(&mut self, start: usize, count: usize, offset: Vec3) {
        self.for_each_vertex(start, count, |v| v + offset);
    }

    pub fn scale(&mut self, start: usize, count: usize, factor: Vec3) {
        self.for_each_vertex(start, count, |v| v * factor);
    }

    /// Rotates around `axis` (through the origin) by `angle` degrees.
    pub fn rotate(&mut self, start: usize, count: usize, angle: f32, axis: Vec3) {
        let rotation = Quat::from_axis_angle(axis.normalize_or_zero(), angle.to_radians());
        self.for_each_vertex(start, count, |v| rotation * v);
    }

    /// Rotates by Euler angles in degrees, applied in x, y, z order.
    pub fn rotate_euler(&mut self, start: usize, count: usize, pitch: f32, yaw: f32, roll: f32) {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            pitch.to_radians(),
            yaw.to_radians(),
            roll.to_radians(),
        );
        self.for_each_vertex(start, count, |v| rotation * v);
    }

    pub fn transform(&mut self, start: usize, count: usize, matrix: &Mat4) {
        self.for_each_vertex(start, count, |v| matrix.transform_point3(v));
    }

    pub fn transform3(&mut self, start: usize, count: usize, matrix: &Mat3) {
        self.for_each_vertex(start, count, |v| *matrix * v);
    }

    fn swap_faces(&mut self, a: usize, b: usize) {
        fn swap_block<T>(data: &mut [T], width: usize, a: usize, b: usize) {
            for i in 0..width {
                data.swap(a * width + i, b * width + i);
            }
        }
        swap_block(&mut self.position, FI_POSITION, a, b);
        swap_block(&mut self.uv, FI_UV, a, b);
        swap_block(&mut self.ao, FI_AO, a, b);
        swap_block(&mut self.color, FI_COLOR, a, b);
        self.sunlight.swap(a, b);
        self.blocklight.swap(a, b);
        self.material.swap(a, b);
    }

    /// Stable sort of all faces by material.
    ///
    /// Sorts an index array first, then moves every face once along the
    /// permutation's cycles.
    pub fn sort(&mut self) {
        if self.size <= 1 {
            return;
        }
        let mut order: Vec<usize> = (0..self.size).collect();
        order.sort_by_key(|&i| self.material[i]);

        let mut placed = vec![false; self.size];
        for start in 0..self.size {
            if placed[start] {
                continue;
            }
            let mut current = start;
            loop {
                placed[current] = true;
                let next = order[current];
                if next == start {
                    break;
                }
                self.swap_faces(current, next);
                current = next;
            }
        }
    }
}

struct PoolState {
    models: Vec<ArrayTileModel>,
}

/// Shared pool of tile models.
///
/// A model whose high-water mark stays below two thirds of its capacity
/// for longer than the shrink period is dropped instead of recycled.
pub struct TileModelPool {
    state: Mutex<PoolState>,
    initial_capacity: usize,
    max_faces: usize,
    shrink_after: Duration,
}

impl std::fmt::Debug for TileModelPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileModelPool")
            .field("pooled", &self.state.lock().models.len())
            .field("max_faces", &self.max_faces)
            .finish()
    }
}

impl TileModelPool {
    pub const DEFAULT_INITIAL_CAPACITY: usize = 100;

    pub fn new(initial_capacity: usize, max_faces: usize, shrink_after: Duration) -> Self {
        TileModelPool {
            state: Mutex::new(PoolState { models: Vec::new() }),
            initial_capacity,
            max_faces,
            shrink_after,
        }
    }

    pub fn claim(&self) -> ArrayTileModel {
        self.state
            .lock()
            .models
            .pop()
            .unwrap_or_else(|| ArrayTileModel::new(self.initial_capacity, self.max_faces))
    }

    /// Returns a model to the pool; returns `false` if it was dropped instead.
    pub fn recycle(&self, model: ArrayTileModel) -> bool {
        self.recycle_at(model, Instant::now())
    }

    fn recycle_at(&self, mut model: ArrayTileModel, now: Instant) -> bool {
        let underused = model.capacity > self.initial_capacity
            && model.high_water * 3 < model.capacity * 2;
        if underused {
            let since = *model.underused_since.get_or_insert(now);
            if now.duration_since(since) >= self.shrink_after {
                return false;
            }
        } else {
            model.underused_since = None;
        }
        model.clear();
        self.state.lock().models.push(model);
        true
    }

    pub fn pooled(&self) -> usize {
        self.state.lock().models.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn face_signature(model: &ArrayTileModel, face: usize) -> Vec<u32> {
        let mut sig: Vec<u32> = model
            .positions(face)
            .iter()
            .flat_map(|v| [v.x.to_bits(), v.y.to_bits(), v.z.to_bits()])
            .collect();
        sig.extend(model.uvs(face).iter().map(|f| f.to_bits()));
        sig.extend(model.ao(face).iter().map(|f| f.to_bits()));
        sig.extend(model.color(face).iter().map(|f| f.to_bits()));
        sig.push(model.sunlight(face) as u32);
        sig.push(model.blocklight(face) as u32);
        sig.push(model.material(face) as u32);
        sig
    }

    #[test]
    fn test_add_grows_and_caps() {
        let mut model = ArrayTileModel::new(4, 20);
        assert_eq!(model.add(3).unwrap(), 0);
        assert_eq!(model.add(3).unwrap(), 3);
        assert!(model.capacity() >= 6);
        assert_eq!(model.add(14).unwrap(), 6);
        assert_eq!(model.capacity(), 20);
        match model.add(1) {
            Err(MapError::TooComplex { faces, max }) => {
                assert_eq!((faces, max), (21, 20));
            }
            other => panic!("expected TooComplex, got {:?}", other),
        }
        // the failed add leaves the model untouched
        assert_eq!(model.size(), 20);
    }

    #[test]
    fn test_transforms_touch_only_positions() {
        let mut model = ArrayTileModel::new(2, 100);
        let face = model.add(2).unwrap();
        model.set_positions(face, [Vec3::X, Vec3::Y, Vec3::Z]);
        model.set_positions(face + 1, [Vec3::X, Vec3::Y, Vec3::Z]);
        model.set_uvs(face, [0.5; 6]);

        model.translate(face, 1, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(model.positions(0)[0], Vec3::new(2.0, 2.0, 3.0));
        // second face is outside the range
        assert_eq!(model.positions(1)[0], Vec3::X);
        assert_eq!(model.uvs(0), &[0.5; 6]);

        model.scale(1, 1, Vec3::splat(2.0));
        assert_eq!(model.positions(1)[1], Vec3::new(0.0, 2.0, 0.0));

        model.rotate(1, 1, 90.0, Vec3::Y);
        let rotated = model.positions(1)[0];
        assert!((rotated - Vec3::new(0.0, 0.0, -2.0)).length() < 1e-5);

        model.rotate_euler(0, 1, 0.0, 0.0, 0.0);
        assert_eq!(model.positions(0)[0], Vec3::new(2.0, 2.0, 3.0));

        model.transform(0, 2, &Mat4::from_translation(Vec3::new(0.0, -2.0, 0.0)));
        assert_eq!(model.positions(0)[0], Vec3::new(2.0, 0.0, 3.0));
        model.transform3(0, 1, &Mat3::IDENTITY);
        assert_eq!(model.positions(0)[0], Vec3::new(2.0, 0.0, 3.0));
    }

    #[test]
    fn test_sort_moves_faces_together() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut model = ArrayTileModel::new(8, 10_000);
        let count = 500;
        let start = model.add(count).unwrap();
        for face in start..start + count {
            let mut p = || Vec3::new(rng.gen(), rng.gen(), rng.gen());
            let corners = [p(), p(), p()];
            model.set_positions(face, corners);
            model.set_uvs(face, [rng.gen(); 6]);
            model.set_ao(face, [rng.gen(), rng.gen(), rng.gen()]);
            model.set_color(face, [rng.gen(), rng.gen(), rng.gen()]);
            model.set_lights(face, rng.gen_range(0..16), rng.gen_range(0..16));
            model.set_material(face, rng.gen_range(0..12));
        }
        let mut before: Vec<Vec<u32>> = (0..count).map(|f| face_signature(&model, f)).collect();

        model.sort();

        let materials: Vec<i32> = (0..count).map(|f| model.material(f)).collect();
        assert!(materials.windows(2).all(|w| w[0] <= w[1]));

        let mut after: Vec<Vec<u32>> = (0..count).map(|f| face_signature(&model, f)).collect();
        // stable: equal materials keep their relative order
        let expected_order: Vec<Vec<u32>> = {
            let mut indexed: Vec<(i32, usize)> =
                before.iter().enumerate().map(|(i, s)| (s[s.len() - 1] as i32, i)).collect();
            indexed.sort();
            indexed.iter().map(|&(_, i)| before[i].clone()).collect()
        };
        assert_eq!(after, expected_order);

        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn test_pool_reuses_and_shrinks() {
        let pool = TileModelPool::new(10, 10_000, Duration::from_secs(60));
        let mut model = pool.claim();
        model.add(1000).unwrap();
        let capacity = model.capacity();
        assert!(pool.recycle(model));
        assert_eq!(pool.pooled(), 1);

        // reused with its capacity, then barely used
        let mut model = pool.claim();
        assert_eq!(model.capacity(), capacity);
        model.add(5).unwrap();
        let t0 = Instant::now();
        assert!(pool.recycle_at(model, t0));

        let mut model = pool.claim();
        model.add(5).unwrap();
        assert!(pool.recycle_at(model, t0 + Duration::from_secs(30)));

        let mut model = pool.claim();
        model.add(5).unwrap();
        assert!(!pool.recycle_at(model, t0 + Duration::from_secs(61)));
        assert_eq!(pool.pooled(), 0);

        // a fresh model starts small again
        assert_eq!(pool.claim().capacity(), 10);
    }

    #[test]
    fn test_busy_model_resets_underuse_timer() {
        let pool = TileModelPool::new(10, 10_000, Duration::from_secs(60));
        let mut model = pool.claim();
        model.add(1000).unwrap();
        let t0 = Instant::now();
        pool.recycle_at(model, t0);

        let mut model = pool.claim();
        model.add(10).unwrap();
        pool.recycle_at(model, t0);
        let mut model = pool.claim();
        let cap = model.capacity();
        model.add(cap).unwrap();
        pool.recycle_at(model, t0 + Duration::from_secs(50));
        let mut model = pool.claim();
        model.add(10).unwrap();
        assert!(pool.recycle_at(model, t0 + Duration::from_secs(70)));
    }
}
