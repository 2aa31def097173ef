use super::{CombinedRenderTask, ForceStrategy, RenderTask, WorldRegionRenderTask};
use crate::error::Result;
use crate::grid::REGION_GRID;
use crate::map::RenderMap;
use crate::vector::Vec2i;
use log::info;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Squared distance from `point` to the nearest block of a region.
fn region_distance_squared(region: Vec2i, point: Vec2i) -> i64 {
    let min = REGION_GRID.cell_min(region);
    let max = REGION_GRID.cell_max(region);
    let dx = (min.x - point.x).max(point.x - max.x).max(0) as i64;
    let dz = (min.y - point.y).max(point.y - max.y).max(0) as i64;
    dx * dx + dz * dz
}

/// Updates a set of regions of one map, one region task after another.
pub struct MapUpdateTask {
    map_id: String,
    regions: Vec<Vec2i>,
    inner: CombinedRenderTask,
}

impl MapUpdateTask {
    pub fn new(map: Arc<RenderMap>, regions: Vec<Vec2i>, force: ForceStrategy) -> Self {
        let tasks = regions
            .iter()
            .map(|&region| {
                Arc::new(WorldRegionRenderTask::new(Arc::clone(&map), region, force))
                    as Arc<dyn RenderTask>
            })
            .collect();
        MapUpdateTask {
            inner: CombinedRenderTask::new(format!("Update map '{}'", map.id()), tasks),
            map_id: map.id().to_string(),
            regions,
        }
    }

    /// Every region of the world, or those within `radius` blocks of
    /// `center`, nearest first.
    pub fn for_world(
        map: Arc<RenderMap>,
        force: ForceStrategy,
        filter: Option<(Vec2i, i32)>,
    ) -> Result<Self> {
        let mut regions = map.world().list_regions()?;
        match filter {
            Some((center, radius)) => {
                let limit = radius.max(0) as i64 * radius.max(0) as i64;
                regions.retain(|&r| region_distance_squared(r, center) <= limit);
                regions.sort_by_key(|&r| {
                    let middle = REGION_GRID.cell_min(r) + Vec2i::splat(256);
                    (middle.distance_squared(center), r)
                });
            }
            None => regions.sort(),
        }
        Ok(Self::new(map, regions, force))
    }

    pub fn map_id(&self) -> &str {
        &self.map_id
    }

    pub fn regions(&self) -> &[Vec2i] {
        &self.regions
    }
}

impl RenderTask for MapUpdateTask {
    fn do_work(&self) -> Result<()> {
        self.inner.do_work()
    }

    fn has_more_work(&self) -> bool {
        self.inner.has_more_work()
    }

    fn estimate_progress(&self) -> f64 {
        self.inner.estimate_progress()
    }

    fn cancel(&self) {
        self.inner.cancel()
    }

    fn contains(&self, other: &dyn RenderTask) -> bool {
        self.same_task(other) || self.inner.contains(other)
    }

    fn same_task(&self, other: &dyn RenderTask) -> bool {
        other
            .as_any()
            .downcast_ref::<MapUpdateTask>()
            .is_some_and(|o| self.inner.same_task(&o.inner))
    }

    fn description(&self) -> String {
        format!("Update {} regions of map '{}'", self.regions.len(), self.map_id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn sub_tasks(&self) -> Option<&[Arc<dyn RenderTask>]> {
        self.inner.sub_tasks()
    }
}

/// Deletes everything stored for a map in one step.
pub struct MapPurgeTask {
    map: Arc<RenderMap>,
    done: AtomicBool,
    cancelled: Arc<AtomicBool>,
    progress: AtomicU64,
}

impl MapPurgeTask {
    pub fn new(map: Arc<RenderMap>) -> Self {
        MapPurgeTask {
            map,
            done: AtomicBool::new(false),
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: AtomicU64::new(0f64.to_bits()),
        }
    }
}

impl RenderTask for MapPurgeTask {
    fn do_work(&self) -> Result<()> {
        if self.done.swap(true, Ordering::AcqRel) || self.cancelled.load(Ordering::Acquire) {
            return Ok(());
        }
        info!("Purging map '{}'", self.map.id());
        let cancelled = Arc::clone(&self.cancelled);
        let finished = self.map.purge(&mut |fraction| {
            self.progress.store(fraction.to_bits(), Ordering::Release);
            !cancelled.load(Ordering::Acquire)
        })?;
        if finished {
            self.progress.store(1f64.to_bits(), Ordering::Release);
        }
        Ok(())
    }

    fn has_more_work(&self) -> bool {
        !self.done.load(Ordering::Acquire) && !self.cancelled.load(Ordering::Acquire)
    }

    fn estimate_progress(&self) -> f64 {
        f64::from_bits(self.progress.load(Ordering::Acquire))
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn same_task(&self, other: &dyn RenderTask) -> bool {
        other
            .as_any()
            .downcast_ref::<MapPurgeTask>()
            .is_some_and(|o| o.map.id() == self.map.id())
    }

    fn description(&self) -> String {
        format!("Purge map '{}'", self.map.id())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Flushes a map's state and writes its "last saved" record.
pub struct MapSaveTask {
    map: Arc<RenderMap>,
    done: AtomicBool,
}

impl MapSaveTask {
    pub fn new(map: Arc<RenderMap>) -> Self {
        MapSaveTask {
            map,
            done: AtomicBool::new(false),
        }
    }
}

impl RenderTask for MapSaveTask {
    fn do_work(&self) -> Result<()> {
        if self.done.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.map.save()
    }

    fn has_more_work(&self) -> bool {
        !self.done.load(Ordering::Acquire)
    }

    fn estimate_progress(&self) -> f64 {
        if self.done.load(Ordering::Acquire) {
            1.0
        } else {
            0.0
        }
    }

    fn cancel(&self) {
        self.done.store(true, Ordering::Release);
    }

    fn same_task(&self, other: &dyn RenderTask) -> bool {
        other
            .as_any()
            .downcast_ref::<MapSaveTask>()
            .is_some_and(|o| o.map.id() == self.map.id())
    }

    fn description(&self) -> String {
        format!("Save map '{}'", self.map.id())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
