use crate::vector::Vec2i;
use serde::{Deserialize, Serialize};

/// Premultiplied RGBA color, components in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    /// From straight (non-premultiplied) components.
    pub fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        let a = a.clamp(0.0, 1.0);
        Color {
            r: r * a,
            g: g * a,
            b: b * a,
            a,
        }
    }

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    pub fn from_hex(rgb: u32, a: f32) -> Self {
        let c = |shift: u32| ((rgb >> shift) & 0xFF) as f32 / 255.0;
        Self::rgba(c(16), c(8), c(0), a)
    }

    /// Places `below` underneath this color.
    pub fn underlay(&mut self, below: Color) {
        let remaining = 1.0 - self.a;
        self.r += below.r * remaining;
        self.g += below.g * remaining;
        self.b += below.b * remaining;
        self.a += below.a * remaining;
    }

    pub fn is_opaque(&self) -> bool {
        self.a >= 0.999
    }

    /// Straight components, for writers that expect them.
    pub fn straight(&self) -> [f32; 4] {
        if self.a <= 0.0 {
            return [0.0; 4];
        }
        [self.r / self.a, self.g / self.a, self.b / self.a, self.a]
    }

    pub fn scaled(&self, factor: f32) -> Color {
        Color {
            r: self.r * factor,
            g: self.g * factor,
            b: self.b * factor,
            a: self.a,
        }
    }
}

/// Receives per-column results of a tile render, for the low-res layer.
pub trait TileMetaSink {
    fn set_column(&mut self, x: i32, z: i32, color: Color, height: i32, block_light: u8);
}

/// Per-column color, height and block light of one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileMeta {
    origin: Vec2i,
    size: Vec2i,
    colors: Vec<Color>,
    heights: Vec<i32>,
    lights: Vec<u8>,
}

impl TileMeta {
    pub fn new(origin: Vec2i, size: Vec2i) -> Self {
        let len = (size.x.max(0) * size.y.max(0)) as usize;
        TileMeta {
            origin,
            size,
            colors: vec![Color::TRANSPARENT; len],
            heights: vec![0; len],
            lights: vec![0; len],
        }
    }

    pub fn origin(&self) -> Vec2i {
        self.origin
    }

    pub fn size(&self) -> Vec2i {
        self.size
    }

    fn index(&self, x: i32, z: i32) -> Option<usize> {
        let lx = x - self.origin.x;
        let lz = z - self.origin.y;
        if lx < 0 || lz < 0 || lx >= self.size.x || lz >= self.size.y {
            return None;
        }
        Some((lz * self.size.x + lx) as usize)
    }

    pub fn color(&self, x: i32, z: i32) -> Color {
        self.index(x, z)
            .map_or(Color::TRANSPARENT, |i| self.colors[i])
    }

    pub fn height(&self, x: i32, z: i32) -> i32 {
        self.index(x, z).map_or(0, |i| self.heights[i])
    }

    pub fn block_light(&self, x: i32, z: i32) -> u8 {
        self.index(x, z).map_or(0, |i| self.lights[i])
    }

    /// Resets every column to empty.
    pub fn clear(&mut self) {
        self.colors.fill(Color::TRANSPARENT);
        self.heights.fill(0);
        self.lights.fill(0);
    }

    /// Whether any column has a visible color.
    pub fn has_content(&self) -> bool {
        self.colors.iter().any(|c| c.a > 0.0)
    }
}

impl TileMetaSink for TileMeta {
    fn set_column(&mut self, x: i32, z: i32, color: Color, height: i32, block_light: u8) {
        if let Some(i) = self.index(x, z) {
            self.colors[i] = color;
            self.heights[i] = height;
            self.lights[i] = block_light;
        }
    }
}
