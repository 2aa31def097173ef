//! Render tasks and the worker pool that runs them.

mod manager;
mod map_tasks;
mod progress;
mod region_task;

pub use manager::{CompletedTask, RenderManager};
pub use map_tasks::{MapPurgeTask, MapSaveTask, MapUpdateTask};
pub use progress::ProgressTracker;
pub use region_task::{ForceStrategy, RegionTaskStats, WorldRegionRenderTask};

use crate::error::Result;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

/// A unit of work the manager hands out in small steps.
///
/// `do_work` may be called concurrently from several workers and must
/// return quickly; the manager keeps calling it while `has_more_work`
/// is true.
pub trait RenderTask: Send + Sync {
    fn do_work(&self) -> Result<()>;

    fn has_more_work(&self) -> bool;

    /// Fraction done, 0.0..=1.0.
    fn estimate_progress(&self) -> f64 {
        0.0
    }

    /// Stops handing out work. Work already in progress finishes.
    fn cancel(&self);

    /// Whether finishing this task also does all of `other`'s work.
    fn contains(&self, other: &dyn RenderTask) -> bool {
        self.same_task(other)
    }

    fn same_task(&self, other: &dyn RenderTask) -> bool;

    fn description(&self) -> String;

    fn as_any(&self) -> &dyn Any;

    /// Direct sub-tasks of a composite task.
    fn sub_tasks(&self) -> Option<&[Arc<dyn RenderTask>]> {
        None
    }
}

impl std::fmt::Debug for dyn RenderTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description())
    }
}

/// An ordered sequence of tasks run one after another.
pub struct CombinedRenderTask {
    description: String,
    tasks: Vec<Arc<dyn RenderTask>>,
    cursor: Mutex<usize>,
}

impl CombinedRenderTask {
    pub fn new(description: impl Into<String>, tasks: Vec<Arc<dyn RenderTask>>) -> Self {
        CombinedRenderTask {
            description: description.into(),
            tasks,
            cursor: Mutex::new(0),
        }
    }

    pub fn tasks(&self) -> &[Arc<dyn RenderTask>] {
        &self.tasks
    }

    /// The first sub-task that still has work, moving the cursor past
    /// exhausted ones.
    fn current(&self) -> Option<(usize, Arc<dyn RenderTask>)> {
        let mut cursor = self.cursor.lock();
        while *cursor < self.tasks.len() {
            let task = &self.tasks[*cursor];
            if task.has_more_work() {
                return Some((*cursor, Arc::clone(task)));
            }
            *cursor += 1;
        }
        None
    }
}

impl RenderTask for CombinedRenderTask {
    fn do_work(&self) -> Result<()> {
        match self.current() {
            Some((_, task)) => task.do_work(),
            None => Ok(()),
        }
    }

    fn has_more_work(&self) -> bool {
        self.current().is_some()
    }

    fn estimate_progress(&self) -> f64 {
        if self.tasks.is_empty() {
            return 1.0;
        }
        let (done, partial) = match self.current() {
            Some((index, task)) => (index, task.estimate_progress().clamp(0.0, 1.0)),
            None => (self.tasks.len(), 0.0),
        };
        (done as f64 + partial) / self.tasks.len() as f64
    }

    fn cancel(&self) {
        for task in &self.tasks {
            task.cancel();
        }
    }

    fn contains(&self, other: &dyn RenderTask) -> bool {
        if self.same_task(other) {
            return true;
        }
        if let Some(leaves) = other.sub_tasks() {
            if !leaves.is_empty() {
                return leaves.iter().all(|leaf| self.contains(leaf.as_ref()));
            }
        }
        self.tasks.iter().any(|task| task.contains(other))
    }

    fn same_task(&self, other: &dyn RenderTask) -> bool {
        other
            .as_any()
            .downcast_ref::<CombinedRenderTask>()
            .is_some_and(|o| {
                o.description == self.description
                    && o.tasks.len() == self.tasks.len()
                    && o
                        .tasks
                        .iter()
                        .zip(&self.tasks)
                        .all(|(a, b)| a.same_task(b.as_ref()))
            })
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn sub_tasks(&self) -> Option<&[Arc<dyn RenderTask>]> {
        Some(&self.tasks)
    }
}
