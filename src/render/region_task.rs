use super::RenderTask;
use crate::error::Result;
use crate::grid::{CHUNK_GRID, REGION_GRID};
use crate::map::RenderMap;
use crate::state::{resolve_action, ActionAndNextState, BoundsSituation, TileAction, TileInfo, TileState};
use crate::vector::Vec2i;
use chrono::Utc;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Which tiles are re-rendered even when none of their chunks changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ForceStrategy {
    #[default]
    None,
    All,
    /// Only tiles on the render boundary.
    Edge,
}

/// Counts of what a region task did, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionTaskStats {
    pub rendered: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Progress {
    initialized: bool,
    tile_min: Vec2i,
    width: usize,
    actions: Vec<ActionAndNextState>,
    /// Current hashes of the region's chunks that differ from the stored ones.
    changed_chunks: Vec<(Vec2i, i32)>,
    cursor: usize,
    in_flight: usize,
    completed: bool,
    stats: RegionTaskStats,
}

impl Progress {
    fn total(&self) -> usize {
        self.actions.len()
    }

    fn exhausted(&self) -> bool {
        self.initialized && self.cursor >= self.total()
    }
}

/// Brings every tile overlapping one region up to date.
///
/// The first `do_work` call computes the action for every tile; each later
/// call processes one tile. Several workers may call `do_work` at once.
pub struct WorldRegionRenderTask {
    map: Arc<RenderMap>,
    region: Vec2i,
    force: ForceStrategy,
    progress: Mutex<Progress>,
    cancelled: AtomicBool,
}

impl WorldRegionRenderTask {
    pub fn new(map: Arc<RenderMap>, region: Vec2i, force: ForceStrategy) -> Self {
        WorldRegionRenderTask {
            map,
            region,
            force,
            progress: Mutex::new(Progress::default()),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn map(&self) -> &Arc<RenderMap> {
        &self.map
    }

    pub fn region(&self) -> Vec2i {
        self.region
    }

    pub fn force(&self) -> ForceStrategy {
        self.force
    }

    pub fn stats(&self) -> RegionTaskStats {
        self.progress.lock().stats
    }

    pub fn is_completed(&self) -> bool {
        self.progress.lock().completed
    }

    fn region_chunks(&self) -> (Vec2i, Vec2i) {
        let chunks = REGION_GRID.divide(&CHUNK_GRID);
        (chunks.cell_min(self.region), chunks.cell_max(self.region))
    }

    fn initialize(&self, progress: &mut Progress) -> Result<()> {
        let world = self.map.world();
        world.invalidate_region(self.region);

        let (chunk_min, chunk_max) = self.region_chunks();
        let size = (chunk_max.x - chunk_min.x + 1) as usize;
        let mut changed = vec![false; size * size];
        for z in chunk_min.y..=chunk_max.y {
            for x in chunk_min.x..=chunk_max.x {
                let chunk = Vec2i::new(x, z);
                let hash = world.chunk_hash(chunk)?;
                if hash != self.map.chunk_state().get(chunk) {
                    changed[(z - chunk_min.y) as usize * size + (x - chunk_min.x) as usize] = true;
                    progress.changed_chunks.push((chunk, hash));
                }
            }
        }

        let tile_grid = self.map.tile_grid();
        let tile_min = tile_grid.cell(REGION_GRID.cell_min(self.region));
        let tile_max = tile_grid.cell(REGION_GRID.cell_max(self.region));
        let width = (tile_max.x - tile_min.x + 1) as usize;
        let height = (tile_max.y - tile_min.y + 1) as usize;
        let mut actions = Vec::with_capacity(width * height);
        for tz in tile_min.y..=tile_max.y {
            for tx in tile_min.x..=tile_max.x {
                let tile = Vec2i::new(tx, tz);
                let bounds = self.map.bounds_situation(tile);
                let tile_changed = match self.force {
                    ForceStrategy::All => true,
                    ForceStrategy::Edge if bounds == BoundsSituation::Edge => true,
                    _ => {
                        let first = CHUNK_GRID.cell(tile_grid.cell_min(tile)).max(chunk_min);
                        let last = CHUNK_GRID.cell(tile_grid.cell_max(tile)).min(chunk_max);
                        (first.y..=last.y).any(|cz| {
                            (first.x..=last.x).any(|cx| {
                                changed[(cz - chunk_min.y) as usize * size + (cx - chunk_min.x) as usize]
                            })
                        })
                    }
                };
                let state = self.map.tile_state().get(tile).state;
                actions.push(resolve_action(state, tile_changed, bounds));
            }
        }

        debug!(
            "Region {} of map '{}': {} tiles, {} changed chunks",
            self.region,
            self.map.id(),
            actions.len(),
            progress.changed_chunks.len()
        );
        progress.tile_min = tile_min;
        progress.width = width;
        progress.actions = actions;
        progress.initialized = true;
        Ok(())
    }

    /// Checks every chunk the tile touches; `None` means the tile may render.
    fn check_preconditions(&self, tile: Vec2i) -> Option<TileState> {
        let settings = self.map.settings();
        let world = self.map.world();
        let tile_grid = self.map.tile_grid();
        let first = CHUNK_GRID.cell(tile_grid.cell_min(tile));
        let last = CHUNK_GRID.cell(tile_grid.cell_max(tile));
        let mut inhabited = settings.min_inhabited_time <= 0;
        for z in first.y..=last.y {
            for x in first.x..=last.x {
                let chunk = world.chunk(Vec2i::new(x, z));
                if chunk.is_errored() {
                    return Some(TileState::ChunkError);
                }
                if !chunk.is_generated() {
                    return Some(TileState::NotGenerated);
                }
                if !chunk.has_light_data() && !settings.ignore_missing_light {
                    return Some(TileState::MissingLight);
                }
                if chunk.inhabited_time() >= settings.min_inhabited_time {
                    inhabited = true;
                }
            }
        }
        if !inhabited && settings.inhabited_radius > 0 {
            let r = settings.inhabited_radius;
            inhabited = (first.y - r..=last.y + r).any(|z| {
                (first.x - r..=last.x + r).any(|x| {
                    world.chunk(Vec2i::new(x, z)).inhabited_time() >= settings.min_inhabited_time
                })
            });
        }
        (!inhabited).then_some(TileState::LowInhabitedTime)
    }

    /// Applies one tile's action and persists the resulting state.
    fn process_tile(&self, tile: Vec2i, action: ActionAndNextState) -> (TileAction, bool) {
        let next = match action.action {
            TileAction::None => return (TileAction::None, true),
            TileAction::Delete => {
                if let Err(e) = self.map.unrender_tile(tile) {
                    warn!("Failed to delete tile {} of map '{}': {}", tile, self.map.id(), e);
                }
                action.state
            }
            TileAction::Render => match self.check_preconditions(tile) {
                Some(failed) => {
                    if let Err(e) = self.map.unrender_tile(tile) {
                        warn!("Failed to delete tile {} of map '{}': {}", tile, self.map.id(), e);
                    }
                    failed
                }
                None => match self.map.render_tile(tile) {
                    Ok(()) => action.state,
                    Err(e) => {
                        error!("Failed to render tile {} of map '{}': {}", tile, self.map.id(), e);
                        TileState::RenderError
                    }
                },
            },
        };
        self.map
            .tile_state()
            .set(tile, TileInfo::new(next, Utc::now().timestamp_millis()));
        let ok = match action.action {
            TileAction::Render => next == action.state,
            _ => true,
        };
        (action.action, ok)
    }

    fn complete(&self, changed_chunks: Vec<(Vec2i, i32)>, stats: RegionTaskStats) {
        let chunk_state = self.map.chunk_state();
        for (chunk, hash) in changed_chunks {
            chunk_state.set(chunk, hash);
        }
        info!(
            "Finished region {} of map '{}': {} rendered, {} deleted, {} unchanged, {} failed",
            self.region,
            self.map.id(),
            stats.rendered,
            stats.deleted,
            stats.unchanged,
            stats.failed
        );
        // nothing in this region is read again until its next update
        self.map.world().invalidate_region(self.region);
        if let Err(e) = self.map.flush_pending_meta() {
            error!("Failed to store tile metadata of map '{}': {}", self.map.id(), e);
        }
        if let Err(e) = self.map.save_rate_limited() {
            error!("Failed to save map '{}': {}", self.map.id(), e);
        }
    }
}

impl RenderTask for WorldRegionRenderTask {
    fn do_work(&self) -> Result<()> {
        let (tile, action) = {
            let mut progress = self.progress.lock();
            if !progress.initialized && !progress.completed {
                if let Err(e) = self.initialize(&mut progress) {
                    // no retry: the task ends without touching stored state
                    progress.completed = true;
                    progress.actions.clear();
                    progress.changed_chunks.clear();
                    return Err(e);
                }
            }
            if self.cancelled.load(Ordering::Acquire) || progress.exhausted() {
                return Ok(());
            }
            let index = progress.cursor;
            progress.cursor += 1;
            progress.in_flight += 1;
            let tile = progress.tile_min
                + Vec2i::new((index % progress.width) as i32, (index / progress.width) as i32);
            (tile, progress.actions[index])
        };

        let (done, ok) = self.process_tile(tile, action);

        let finished = {
            let mut progress = self.progress.lock();
            progress.in_flight -= 1;
            match (done, ok) {
                (TileAction::None, _) => progress.stats.unchanged += 1,
                (TileAction::Delete, _) => progress.stats.deleted += 1,
                (TileAction::Render, true) => progress.stats.rendered += 1,
                (TileAction::Render, false) => progress.stats.failed += 1,
            }
            let done = progress.exhausted()
                && progress.in_flight == 0
                && !progress.completed
                && !self.cancelled.load(Ordering::Acquire);
            if done {
                progress.completed = true;
                progress.actions = Vec::new();
                Some((std::mem::take(&mut progress.changed_chunks), progress.stats))
            } else {
                None
            }
        };
        if let Some((changed, stats)) = finished {
            self.complete(changed, stats);
        }
        Ok(())
    }

    fn has_more_work(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        let progress = self.progress.lock();
        !progress.completed && !progress.exhausted()
    }

    fn estimate_progress(&self) -> f64 {
        let progress = self.progress.lock();
        if progress.completed {
            1.0
        } else if !progress.initialized || progress.total() == 0 {
            0.0
        } else {
            progress.cursor as f64 / progress.total() as f64
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn same_task(&self, other: &dyn RenderTask) -> bool {
        other
            .as_any()
            .downcast_ref::<WorldRegionRenderTask>()
            .is_some_and(|o| {
                o.map.id() == self.map.id() && o.region == self.region && o.force == self.force
            })
    }

    fn description(&self) -> String {
        format!("Render region {} of map '{}'", self.region, self.map.id())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
