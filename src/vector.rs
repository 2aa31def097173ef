use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Horizontal integer position. `y` is the second horizontal axis
/// (world Z) when used for chunk, region or tile coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vec2i {
    pub x: i32,
    pub y: i32,
}

impl Vec2i {
    pub const ZERO: Vec2i = Vec2i { x: 0, y: 0 };
    pub const ONE: Vec2i = Vec2i { x: 1, y: 1 };

    pub const fn new(x: i32, y: i32) -> Self {
        Vec2i { x, y }
    }

    pub const fn splat(v: i32) -> Self {
        Vec2i { x: v, y: v }
    }

    pub fn min(self, other: Vec2i) -> Vec2i {
        Vec2i::new(self.x.min(other.x), self.y.min(other.y))
    }

    pub fn max(self, other: Vec2i) -> Vec2i {
        Vec2i::new(self.x.max(other.x), self.y.max(other.y))
    }

    pub fn distance_squared(self, other: Vec2i) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        dx * dx + dy * dy
    }
}

impl Add for Vec2i {
    type Output = Vec2i;
    fn add(self, rhs: Vec2i) -> Vec2i {
        Vec2i::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2i {
    type Output = Vec2i;
    fn sub(self, rhs: Vec2i) -> Vec2i {
        Vec2i::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul for Vec2i {
    type Output = Vec2i;
    fn mul(self, rhs: Vec2i) -> Vec2i {
        Vec2i::new(self.x * rhs.x, self.y * rhs.y)
    }
}

impl fmt::Display for Vec2i {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Vec2i {
    fn from((x, y): (i32, i32)) -> Self {
        Vec2i::new(x, y)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vec3i {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Vec3i {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Vec3i { x, y, z }
    }
}

impl fmt::Display for Vec3i {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<(i32, i32, i32)> for Vec3i {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Vec3i::new(x, y, z)
    }
}

/// Inclusive integer box in block space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockBox {
    pub min: Vec3i,
    pub max: Vec3i,
}

impl BlockBox {
    pub fn new(min: Vec3i, max: Vec3i) -> Self {
        BlockBox {
            min: Vec3i::new(min.x.min(max.x), min.y.min(max.y), min.z.min(max.z)),
            max: Vec3i::new(min.x.max(max.x), min.y.max(max.y), min.z.max(max.z)),
        }
    }

    pub fn contains(&self, x: i32, y: i32, z: i32) -> bool {
        x >= self.min.x
            && x <= self.max.x
            && y >= self.min.y
            && y <= self.max.y
            && z >= self.min.z
            && z <= self.max.z
    }

    /// Grows the box by `amount` on every side.
    pub fn expand(&self, amount: i32) -> BlockBox {
        BlockBox {
            min: Vec3i::new(
                self.min.x.saturating_sub(amount),
                self.min.y.saturating_sub(amount),
                self.min.z.saturating_sub(amount),
            ),
            max: Vec3i::new(
                self.max.x.saturating_add(amount),
                self.max.y.saturating_add(amount),
                self.max.z.saturating_add(amount),
            ),
        }
    }

    pub fn intersects(&self, other: &BlockBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn is_inside(&self, outer: &BlockBox) -> bool {
        self.min.x >= outer.min.x
            && self.max.x <= outer.max.x
            && self.min.y >= outer.min.y
            && self.max.y <= outer.max.y
            && self.min.z >= outer.min.z
            && self.max.z <= outer.max.z
    }
}
