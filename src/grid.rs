//! Affine integer grids used for every coordinate translation between
//! blocks, chunks, regions and tiles.
//!
//! A grid with cell size `s` and offset `o` maps cell `c` to the block
//! range `[c * s + o, (c + 1) * s + o - 1]`. All conversions use floor
//! division, so negative coordinates land in the right cell.

use crate::vector::Vec2i;
use serde::{Deserialize, Serialize};

pub const UNIT: Grid = Grid::new(Vec2i::ONE, Vec2i::ZERO);
pub const CHUNK_GRID: Grid = Grid::new(Vec2i::splat(16), Vec2i::ZERO);
pub const REGION_GRID: Grid = Grid::new(Vec2i::splat(512), Vec2i::ZERO);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grid {
    size: Vec2i,
    offset: Vec2i,
}

impl Grid {
    /// Panics at compile time or on construction if a cell size is not positive.
    pub const fn new(size: Vec2i, offset: Vec2i) -> Self {
        assert!(size.x > 0 && size.y > 0, "grid cell size must be positive");
        Grid { size, offset }
    }

    pub fn size(&self) -> Vec2i {
        self.size
    }

    pub fn offset(&self) -> Vec2i {
        self.offset
    }

    pub fn cell_x(&self, x: i32) -> i32 {
        (x - self.offset.x).div_euclid(self.size.x)
    }

    pub fn cell_y(&self, y: i32) -> i32 {
        (y - self.offset.y).div_euclid(self.size.y)
    }

    pub fn cell(&self, pos: Vec2i) -> Vec2i {
        Vec2i::new(self.cell_x(pos.x), self.cell_y(pos.y))
    }

    /// Position relative to the minimum of the containing cell.
    pub fn local(&self, pos: Vec2i) -> Vec2i {
        Vec2i::new(
            (pos.x - self.offset.x).rem_euclid(self.size.x),
            (pos.y - self.offset.y).rem_euclid(self.size.y),
        )
    }

    pub fn cell_min(&self, cell: Vec2i) -> Vec2i {
        cell * self.size + self.offset
    }

    pub fn cell_max(&self, cell: Vec2i) -> Vec2i {
        self.cell_min(cell) + self.size - Vec2i::ONE
    }

    /// First cell of `target` that overlaps `cell` of this grid.
    pub fn cell_min_in(&self, cell: Vec2i, target: &Grid) -> Vec2i {
        target.cell(self.cell_min(cell))
    }

    /// Last cell of `target` that overlaps `cell` of this grid.
    pub fn cell_max_in(&self, cell: Vec2i, target: &Grid) -> Vec2i {
        target.cell(self.cell_max(cell))
    }

    /// All cells of `target` overlapping `cell` of this grid, row-major.
    pub fn intersecting_cells(&self, cell: Vec2i, target: &Grid) -> Vec<Vec2i> {
        let min = self.cell_min_in(cell, target);
        let max = self.cell_max_in(cell, target);
        let mut cells = Vec::with_capacity(((max.x - min.x + 1) * (max.y - min.y + 1)) as usize);
        for y in min.y..=max.y {
            for x in min.x..=max.x {
                cells.push(Vec2i::new(x, y));
            }
        }
        cells
    }

    /// Composes two grids: `other` is expressed in cells of `self`.
    ///
    /// `self.multiply(other).cell_min(c) == self.cell_min(other.cell_min(c))`.
    pub fn multiply(&self, other: &Grid) -> Grid {
        Grid::new(
            self.size * other.size,
            other.offset * self.size + self.offset,
        )
    }

    /// Inverse of [`Grid::multiply`]: expresses `self` in cells of `other`.
    /// Only exact when `self`'s size and offset are aligned to `other`.
    pub fn divide(&self, other: &Grid) -> Grid {
        Grid::new(
            Vec2i::new(self.size.x / other.size.x, self.size.y / other.size.y),
            Vec2i::new(
                (self.offset.x - other.offset.x).div_euclid(other.size.x),
                (self.offset.y - other.offset.y).div_euclid(other.size.y),
            ),
        )
    }
}

impl Default for Grid {
    fn default() -> Self {
        UNIT
    }
}
