//! Builds the geometry of one tile from world blocks.

use super::meta::{Color, TileMetaSink};
use super::model::ArrayTileModel;
use super::resource::{BlockProperties, ResourcePack, TextureGallery};
use crate::chunk::{Chunk, LightData};
use crate::error::Result;
use crate::grid::CHUNK_GRID;
use crate::mask::{Mask, TriState};
use crate::vector::{BlockBox, Vec2i, Vec3i};
use crate::world::World;
use glam::Vec3;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Per-call scratch state: chunks already fetched for this tile.
pub struct RenderContext<'w> {
    world: &'w World,
    chunks: FxHashMap<Vec2i, Arc<Chunk>>,
}

impl<'w> RenderContext<'w> {
    pub fn new(world: &'w World) -> Self {
        RenderContext {
            world,
            chunks: FxHashMap::default(),
        }
    }

    pub fn world(&self) -> &'w World {
        self.world
    }

    pub fn chunk_at(&mut self, x: i32, z: i32) -> Arc<Chunk> {
        let pos = CHUNK_GRID.cell(Vec2i::new(x, z));
        let world = self.world;
        Arc::clone(self.chunks.entry(pos).or_insert_with(|| world.chunk(pos)))
    }

    fn light(&mut self, x: i32, y: i32, z: i32) -> LightData {
        self.chunk_at(x, z).light(x, y, z)
    }
}

#[derive(Debug, Clone, Copy)]
enum Face {
    Up,
    North,
    South,
    West,
    East,
}

impl Face {
    const ALL: [Face; 5] = [Face::Up, Face::North, Face::South, Face::West, Face::East];

    fn offset(self) -> Vec3i {
        match self {
            Face::Up => Vec3i::new(0, 1, 0),
            Face::North => Vec3i::new(0, 0, -1),
            Face::South => Vec3i::new(0, 0, 1),
            Face::West => Vec3i::new(-1, 0, 0),
            Face::East => Vec3i::new(1, 0, 0),
        }
    }

    /// Unit-cube corners of the face, counter-clockwise seen from outside.
    fn corners(self) -> [Vec3; 4] {
        match self {
            Face::Up => [
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 1.0),
                Vec3::new(1.0, 1.0, 1.0),
                Vec3::new(1.0, 1.0, 0.0),
            ],
            Face::North => [
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            Face::South => [
                Vec3::new(0.0, 1.0, 1.0),
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(1.0, 1.0, 1.0),
            ],
            Face::West => [
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(0.0, 1.0, 1.0),
            ],
            Face::East => [
                Vec3::new(1.0, 1.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
            ],
        }
    }

    fn shade(self) -> f32 {
        match self {
            Face::Up => 1.0,
            Face::North | Face::South => 0.8,
            Face::West | Face::East => 0.6,
        }
    }
}

/// Emits a quad as two triangles; returns the first face index.
fn emit_quad(
    model: &mut ArrayTileModel,
    corners: [Vec3; 4],
    rgb: [f32; 3],
    light: LightData,
    material: i32,
) -> Result<usize> {
    let start = model.add(2)?;
    model.set_positions(start, [corners[0], corners[1], corners[2]]);
    model.set_positions(start + 1, [corners[0], corners[2], corners[3]]);
    model.set_uvs(start, [0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    model.set_uvs(start + 1, [0.0, 0.0, 1.0, 1.0, 1.0, 0.0]);
    for face in start..start + 2 {
        model.set_ao(face, [1.0; 3]);
        model.set_color(face, rgb);
        model.set_lights(face, light.sky, light.block);
        model.set_material(face, material);
    }
    Ok(start)
}

/// The geometry passes run for every tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPass {
    Blocks,
    Entities,
}

impl RenderPass {
    pub const ALL: [RenderPass; 2] = [RenderPass::Blocks, RenderPass::Entities];
}

/// Renders tiles of one map.
pub struct HiresModelRenderer {
    resources: Arc<dyn ResourcePack>,
    gallery: Arc<TextureGallery>,
    render_top_only: bool,
}

impl std::fmt::Debug for HiresModelRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiresModelRenderer")
            .field("render_top_only", &self.render_top_only)
            .finish()
    }
}

impl HiresModelRenderer {
    pub fn new(
        resources: Arc<dyn ResourcePack>,
        gallery: Arc<TextureGallery>,
        render_top_only: bool,
    ) -> Self {
        HiresModelRenderer {
            resources,
            gallery,
            render_top_only,
        }
    }

    /// Renders the block columns `min..=max` (x and z).
    ///
    /// Geometry goes into `model` when one is given; column metadata always
    /// goes into `meta`. Positions are relative to `min` at y = 0.
    pub fn render(
        &self,
        world: &World,
        mask: &Mask,
        min: Vec2i,
        max: Vec2i,
        mut model: Option<&mut ArrayTileModel>,
        meta: &mut dyn TileMetaSink,
    ) -> Result<()> {
        let dim = world.dimension();
        let bounds = BlockBox::new(
            Vec3i::new(min.x, dim.min_y, min.y),
            Vec3i::new(max.x, dim.max_y(), max.y),
        );
        let mask = mask.submask(&bounds);
        let mut ctx = RenderContext::new(world);
        for pass in RenderPass::ALL {
            match pass {
                RenderPass::Blocks => {
                    self.render_blocks(&mut ctx, &mask, &bounds, model.as_deref_mut(), meta)?
                }
                RenderPass::Entities => {
                    if let Some(model) = model.as_deref_mut() {
                        self.render_entities(&mut ctx, &mask, &bounds, model)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn properties(&self, ctx: &mut RenderContext<'_>, mask: &Mask, x: i32, y: i32, z: i32) -> BlockProperties {
        if !mask.test(x, y, z) {
            return BlockProperties::invisible();
        }
        let chunk = ctx.chunk_at(x, z);
        self.resources.block_properties(chunk.block_state(x, y, z))
    }

    fn render_blocks(
        &self,
        ctx: &mut RenderContext<'_>,
        mask: &Mask,
        bounds: &BlockBox,
        mut model: Option<&mut ArrayTileModel>,
        meta: &mut dyn TileMetaSink,
    ) -> Result<()> {
        let origin = Vec3::new(bounds.min.x as f32, 0.0, bounds.min.z as f32);
        for z in bounds.min.z..=bounds.max.z {
            for x in bounds.min.x..=bounds.max.x {
                let column = BlockBox::new(
                    Vec3i::new(x, bounds.min.y, z),
                    Vec3i::new(x, bounds.max.y, z),
                );
                if mask.test_range(&column) == TriState::False {
                    meta.set_column(x, z, Color::TRANSPARENT, 0, 0);
                    continue;
                }

                let chunk = ctx.chunk_at(x, z);
                let mut top = chunk.max_y().min(bounds.max.y);
                if let Some(surface) = chunk.world_surface_y(x, z) {
                    top = top.min(surface - 1);
                }
                let bottom = chunk.min_y().max(bounds.min.y);

                let mut color = Color::TRANSPARENT;
                let mut height = None;
                let mut block_light = 0.0f32;

                let mut y = top;
                while y >= bottom {
                    let props = self.properties(ctx, mask, x, y, z);
                    if props.is_visible() {
                        let remaining = 1.0 - color.a;
                        let light = ctx.light(x, y + 1, z);
                        block_light = block_light.max(light.block as f32 * remaining);
                        color.underlay(props.color);
                        height.get_or_insert(y);

                        if let Some(model) = model.as_deref_mut() {
                            self.emit_block(ctx, mask, model, &props, x, y, z, origin)?;
                        }

                        if self.render_top_only && color.is_opaque() && props.culling {
                            break;
                        }
                    }
                    y -= 1;
                }

                meta.set_column(
                    x,
                    z,
                    color,
                    height.unwrap_or(0),
                    block_light.round().clamp(0.0, 15.0) as u8,
                );
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_block(
        &self,
        ctx: &mut RenderContext<'_>,
        mask: &Mask,
        model: &mut ArrayTileModel,
        props: &BlockProperties,
        x: i32,
        y: i32,
        z: i32,
        origin: Vec3,
    ) -> Result<()> {
        let material = self.gallery.get(&props.material);
        for face in Face::ALL {
            let n = face.offset();
            let (nx, ny, nz) = (x + n.x, y + n.y, z + n.z);
            let neighbour = self.properties(ctx, mask, nx, ny, nz);
            if neighbour.culling || neighbour.material == props.material {
                continue;
            }
            let straight = props.color.straight();
            let shade = face.shade();
            let rgb = [straight[0] * shade, straight[1] * shade, straight[2] * shade];
            let light = ctx.light(nx, ny, nz);
            let start = emit_quad(model, face.corners(), rgb, light, material)?;
            let offset = Vec3::new(x as f32, y as f32, z as f32) - origin;
            model.translate(start, 2, offset);
        }
        Ok(())
    }

    fn render_entities(
        &self,
        ctx: &mut RenderContext<'_>,
        mask: &Mask,
        bounds: &BlockBox,
        model: &mut ArrayTileModel,
    ) -> Result<()> {
        let origin = Vec3::new(bounds.min.x as f32, 0.0, bounds.min.z as f32);
        let min = Vec2i::new(bounds.min.x, bounds.min.z);
        let max = Vec2i::new(bounds.max.x, bounds.max.z);
        let first = CHUNK_GRID.cell(min);
        let last = CHUNK_GRID.cell(max);
        for cz in first.y..=last.y {
            for cx in first.x..=last.x {
                let chunk = ctx.chunk_at(cx * 16, cz * 16);
                for entity in chunk.entities() {
                    let (bx, by, bz) = entity.block_position();
                    if !bounds.contains(bx, by, bz) || !mask.test(bx, by, bz) {
                        continue;
                    }
                    let material = self.gallery.get(&self.resources.entity_material(&entity.id));
                    let light = ctx.light(bx, by, bz);
                    let center = Vec3::new(
                        entity.position.0 as f32,
                        entity.position.1 as f32 + 0.25,
                        entity.position.2 as f32,
                    );
                    // a half-block marker box, all six sides
                    let first_face = model.size();
                    for face in Face::ALL {
                        emit_quad(model, face.corners(), [1.0; 3], light, material)?;
                    }
                    let bottom = emit_quad(model, Face::Up.corners(), [1.0; 3], light, material)?;
                    model.translate(bottom, 2, Vec3::new(0.0, -1.0, 0.0));
                    let count = model.size() - first_face;
                    model.translate(first_face, count, Vec3::splat(-0.5));
                    model.scale(first_face, count, Vec3::splat(0.5));
                    model.translate(first_face, count, center - origin);
                }
            }
        }
        Ok(())
    }
}
