//! Spatial predicates that decide which blocks belong to a map.
//!
//! Every mask answers exact point tests and conservative range tests. A
//! range test may always answer [`TriState::Undefined`]; `True` and
//! `False` are only returned when they hold for every block in the box.

use crate::util::hash_coords;
use crate::vector::{BlockBox, Vec3i};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    True,
    False,
    Undefined,
}

impl TriState {
    pub fn from_bool(value: bool) -> Self {
        if value {
            TriState::True
        } else {
            TriState::False
        }
    }

    /// Logical AND; `other` is only evaluated when `self` is not `False`.
    pub fn and(self, other: impl FnOnce() -> TriState) -> TriState {
        match self {
            TriState::False => TriState::False,
            TriState::True => other(),
            TriState::Undefined => match other() {
                TriState::False => TriState::False,
                _ => TriState::Undefined,
            },
        }
    }
}

fn vertical(min_y: i32, max_y: i32, bounds: &BlockBox) -> TriState {
    if bounds.max.y < min_y || bounds.min.y > max_y {
        TriState::False
    } else if bounds.min.y >= min_y && bounds.max.y <= max_y {
        TriState::True
    } else {
        TriState::Undefined
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxMask {
    pub bounds: BlockBox,
}

impl BoxMask {
    pub fn new(min: Vec3i, max: Vec3i) -> Self {
        BoxMask {
            bounds: BlockBox::new(min, max),
        }
    }

    pub fn test(&self, x: i32, y: i32, z: i32) -> bool {
        self.bounds.contains(x, y, z)
    }

    pub fn test_range(&self, bounds: &BlockBox) -> TriState {
        if bounds.is_inside(&self.bounds) {
            TriState::True
        } else if !bounds.intersects(&self.bounds) {
            TriState::False
        } else {
            TriState::Undefined
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EllipseMask {
    pub center_x: f64,
    pub center_z: f64,
    pub radius_x: f64,
    pub radius_z: f64,
    pub min_y: i32,
    pub max_y: i32,
}

impl EllipseMask {
    pub fn new(center: (f64, f64), radius: (f64, f64), min_y: i32, max_y: i32) -> Self {
        EllipseMask {
            center_x: center.0,
            center_z: center.1,
            radius_x: radius.0,
            radius_z: radius.1,
            min_y,
            max_y,
        }
    }

    fn test_xz(&self, x: f64, z: f64) -> bool {
        let dx = (x - self.center_x) / self.radius_x;
        let dz = (z - self.center_z) / self.radius_z;
        dx * dx + dz * dz <= 1.0
    }

    pub fn test(&self, x: i32, y: i32, z: i32) -> bool {
        y >= self.min_y && y <= self.max_y && self.test_xz(x as f64, z as f64)
    }

    pub fn test_range(&self, bounds: &BlockBox) -> TriState {
        vertical(self.min_y, self.max_y, bounds).and(|| {
            let (min_x, min_z) = (bounds.min.x as f64, bounds.min.z as f64);
            let (max_x, max_z) = (bounds.max.x as f64, bounds.max.z as f64);
            if self.test_xz(min_x, min_z)
                && self.test_xz(min_x, max_z)
                && self.test_xz(max_x, min_z)
                && self.test_xz(max_x, max_z)
            {
                return TriState::True;
            }
            let nearest_x = self.center_x.clamp(min_x, max_x);
            let nearest_z = self.center_z.clamp(min_z, max_z);
            if !self.test_xz(nearest_x, nearest_z) {
                TriState::False
            } else {
                TriState::Undefined
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolygonMask {
    /// Horizontal outline as `(x, z)` points; the last point connects to the first.
    pub points: Vec<(f64, f64)>,
    pub min_y: i32,
    pub max_y: i32,
}

/// Intersection of segments `a1-a2` and `b1-b2`. Parallel segments never intersect.
fn segments_intersect(a1: (f64, f64), a2: (f64, f64), b1: (f64, f64), b2: (f64, f64)) -> bool {
    let r = (a2.0 - a1.0, a2.1 - a1.1);
    let s = (b2.0 - b1.0, b2.1 - b1.1);
    let v = r.0 * s.1 - r.1 * s.0;
    if v.abs() < 1e-9 {
        return false;
    }
    let q = (b1.0 - a1.0, b1.1 - a1.1);
    let t = (q.0 * s.1 - q.1 * s.0) / v;
    let u = (q.0 * r.1 - q.1 * r.0) / v;
    (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)
}

impl PolygonMask {
    pub fn new(points: Vec<(f64, f64)>, min_y: i32, max_y: i32) -> Self {
        PolygonMask {
            points,
            min_y,
            max_y,
        }
    }

    fn test_xz(&self, x: f64, z: f64) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, zi) = self.points[i];
            let (xj, zj) = self.points[j];
            if (zi > z) != (zj > z) && x < (xj - xi) * (z - zi) / (zj - zi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    pub fn test(&self, x: i32, y: i32, z: i32) -> bool {
        y >= self.min_y && y <= self.max_y && self.test_xz(x as f64, z as f64)
    }

    fn test_range_xz(&self, bounds: &BlockBox) -> TriState {
        if self.points.len() < 3 {
            return TriState::False;
        }
        let min = (bounds.min.x as f64 - 0.5, bounds.min.z as f64 - 0.5);
        let max = (bounds.max.x as f64 + 0.5, bounds.max.z as f64 + 0.5);
        let corners = [min, (max.0, min.1), max, (min.0, max.1)];

        // a vertex inside the box means the outline enters it
        if self
            .points
            .iter()
            .any(|&(x, z)| x >= min.0 && x <= max.0 && z >= min.1 && z <= max.1)
        {
            return TriState::Undefined;
        }

        let n = self.points.len();
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            for side in 0..4 {
                if segments_intersect(a, b, corners[side], corners[(side + 1) % 4]) {
                    return TriState::Undefined;
                }
            }
        }

        TriState::from_bool(self.test_xz(bounds.min.x as f64, bounds.min.z as f64))
    }

    pub fn test_range(&self, bounds: &BlockBox) -> TriState {
        vertical(self.min_y, self.max_y, bounds).and(|| self.test_range_xz(bounds))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlurMask {
    pub inner: Box<Mask>,
    pub size: i32,
    pub salt: u64,
}

impl BlurMask {
    pub fn new(inner: Mask, size: i32) -> Self {
        BlurMask {
            inner: Box::new(inner),
            size: size.max(0),
            salt: 0x6E75_636D_6170,
        }
    }

    fn offset(&self, x: i32, y: i32, z: i32) -> Vec3i {
        if self.size == 0 {
            return Vec3i::new(0, 0, 0);
        }
        let span = (self.size * 2 + 1) as u64;
        let hash = hash_coords(x, y, z, self.salt);
        let component = |shift: u32| ((hash >> shift) & 0x1F_FFFF) as u64 % span;
        Vec3i::new(
            component(0) as i32 - self.size,
            component(21) as i32 - self.size,
            component(42) as i32 - self.size,
        )
    }

    pub fn test(&self, x: i32, y: i32, z: i32) -> bool {
        let d = self.offset(x, y, z);
        self.inner.test(x + d.x, y + d.y, z + d.z)
    }

    pub fn test_range(&self, bounds: &BlockBox) -> TriState {
        self.inner.test_range(&bounds.expand(self.size))
    }
}

/// Ordered layers; later layers take precedence where their mask applies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedMask {
    layers: Vec<(Mask, bool)>,
}

impl CombinedMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a layer on top. A negative first layer gets an implicit
    /// everything-included layer beneath it.
    pub fn add(&mut self, mask: Mask, value: bool) {
        if self.layers.is_empty() && !value {
            self.layers.push((Mask::All, true));
        }
        self.layers.push((mask, value));
    }

    pub fn with(mut self, mask: Mask, value: bool) -> Self {
        self.add(mask, value);
        self
    }

    pub fn layers(&self) -> &[(Mask, bool)] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn test(&self, x: i32, y: i32, z: i32) -> bool {
        self.layers
            .iter()
            .rev()
            .find(|(mask, _)| mask.test(x, y, z))
            .map(|(_, value)| *value)
            .unwrap_or(false)
    }

    pub fn test_range(&self, bounds: &BlockBox) -> TriState {
        Self::range_of(&self.layers, bounds)
    }

    fn range_of(layers: &[(Mask, bool)], bounds: &BlockBox) -> TriState {
        for (i, (mask, value)) in layers.iter().enumerate().rev() {
            match mask.test_range(bounds) {
                TriState::False => continue,
                TriState::True => return TriState::from_bool(*value),
                TriState::Undefined => {
                    // blocks this layer misses fall through to the layers below
                    let below = Self::range_of(&layers[..i], bounds);
                    return if below == TriState::from_bool(*value) {
                        below
                    } else {
                        TriState::Undefined
                    };
                }
            }
        }
        TriState::False
    }

    fn submask(&self, bounds: &BlockBox) -> Mask {
        let mut kept = Vec::new();
        for (mask, value) in self.layers.iter().rev() {
            match mask.test_range(bounds) {
                TriState::False => continue,
                TriState::True => {
                    kept.push((Mask::All, *value));
                    break;
                }
                TriState::Undefined => kept.push((mask.submask(bounds), *value)),
            }
        }
        kept.reverse();
        Mask::Combined(CombinedMask { layers: kept })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Mask {
    #[default]
    All,
    None,
    Box(BoxMask),
    Ellipse(EllipseMask),
    Polygon(PolygonMask),
    Blur(BlurMask),
    Combined(CombinedMask),
}

impl Mask {
    pub fn test(&self, x: i32, y: i32, z: i32) -> bool {
        match self {
            Mask::All => true,
            Mask::None => false,
            Mask::Box(m) => m.test(x, y, z),
            Mask::Ellipse(m) => m.test(x, y, z),
            Mask::Polygon(m) => m.test(x, y, z),
            Mask::Blur(m) => m.test(x, y, z),
            Mask::Combined(m) => m.test(x, y, z),
        }
    }

    pub fn test_range(&self, bounds: &BlockBox) -> TriState {
        match self {
            Mask::All => TriState::True,
            Mask::None => TriState::False,
            Mask::Box(m) => m.test_range(bounds),
            Mask::Ellipse(m) => m.test_range(bounds),
            Mask::Polygon(m) => m.test_range(bounds),
            Mask::Blur(m) => m.test_range(bounds),
            Mask::Combined(m) => m.test_range(bounds),
        }
    }

    /// Whether the mask boundary passes through `bounds`.
    pub fn is_edge(&self, bounds: &BlockBox) -> bool {
        self.test_range(bounds) == TriState::Undefined
    }

    /// A simpler mask that behaves identically inside `bounds`.
    pub fn submask(&self, bounds: &BlockBox) -> Mask {
        match self.test_range(bounds) {
            TriState::True => return Mask::All,
            TriState::False => return Mask::None,
            TriState::Undefined => {}
        }
        match self {
            Mask::Combined(m) => m.submask(bounds),
            Mask::Blur(m) => Mask::Blur(BlurMask {
                inner: Box::new(m.inner.submask(&bounds.expand(m.size))),
                size: m.size,
                salt: m.salt,
            }),
            other => other.clone(),
        }
    }
}

impl From<CombinedMask> for Mask {
    fn from(mask: CombinedMask) -> Self {
        Mask::Combined(mask)
    }
}
