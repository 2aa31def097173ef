use super::{ProgressTracker, RenderTask};
use crate::config::RenderSettings;
use crate::error::{MapError, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A finished task, kept for display.
#[derive(Clone)]
pub struct CompletedTask {
    pub task: Arc<dyn RenderTask>,
    pub finished_at: DateTime<Utc>,
}

impl std::fmt::Debug for CompletedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletedTask")
            .field("task", &self.task.description())
            .field("finished_at", &self.finished_at)
            .finish()
    }
}

struct Queue {
    /// The front task is the active one.
    tasks: VecDeque<Arc<dyn RenderTask>>,
    /// Workers currently inside `do_work` of the active task.
    busy: usize,
}

struct Shared {
    settings: RenderSettings,
    queue: Mutex<Queue>,
    changed: Condvar,
    running: AtomicBool,
    completed: Mutex<VecDeque<CompletedTask>>,
    tracker: Mutex<ProgressTracker>,
}

impl Shared {
    fn finalize(&self, task: Arc<dyn RenderTask>) {
        debug!("Finished task: {}", task.description());
        let mut completed = self.completed.lock();
        completed.push_back(CompletedTask {
            task,
            finished_at: Utc::now(),
        });
        while completed.len() > self.settings.completed_history {
            completed.pop_front();
        }
        drop(completed);
        self.tracker.lock().reset();
    }

    /// Blocks until the active task has work to hand out.
    fn next_work(&self) -> Option<Arc<dyn RenderTask>> {
        let mut queue = self.queue.lock();
        loop {
            if !self.running.load(Ordering::Acquire) {
                return None;
            }
            let front = queue.tasks.front().cloned();
            match front {
                None => {
                    self.changed.wait_for(&mut queue, Duration::from_millis(500));
                }
                Some(task) if !task.has_more_work() => {
                    if queue.busy == 0 {
                        queue.tasks.pop_front();
                        self.finalize(task);
                        self.changed.notify_all();
                    } else {
                        self.changed.wait_for(&mut queue, Duration::from_millis(100));
                    }
                }
                Some(task) => {
                    queue.busy += 1;
                    return Some(task);
                }
            }
        }
    }

    fn sample_progress(&self) {
        let front = self.queue.lock().tasks.front().cloned();
        if let Some(task) = front {
            let progress = task.estimate_progress();
            self.tracker.lock().update(progress);
        }
    }

    fn worker_loop(&self, id: usize) {
        let span = tracing::info_span!("render_worker", id);
        let _entered = span.enter();
        debug!("Render worker {} started", id);
        while let Some(task) = self.next_work() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| task.do_work()));
            {
                let mut queue = self.queue.lock();
                queue.busy -= 1;
                self.changed.notify_all();
            }
            let failure = match result {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("worker panicked".to_string()),
            };
            if let Some(message) = failure {
                error!("Task '{}' failed: {}", task.description(), message);
                thread::sleep(Duration::from_millis(self.settings.error_cooldown_ms));
            }
            self.sample_progress();
        }
        debug!("Render worker {} stopped", id);
    }
}

/// Runs render tasks on a pool of worker threads.
///
/// Only the first queued task receives work. The others wait in order
/// until it is finished or cancelled.
pub struct RenderManager {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for RenderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderManager")
            .field("running", &self.is_running())
            .field("queued", &self.shared.queue.lock().tasks.len())
            .finish()
    }
}

impl RenderManager {
    pub fn new(settings: RenderSettings) -> Self {
        let tracker = ProgressTracker::new(
            Duration::from_millis(settings.progress_interval_ms),
            settings.progress_window,
        );
        RenderManager {
            shared: Arc::new(Shared {
                settings,
                queue: Mutex::new(Queue {
                    tasks: VecDeque::new(),
                    busy: 0,
                }),
                changed: Condvar::new(),
                running: AtomicBool::new(false),
                completed: Mutex::new(VecDeque::new()),
                tracker: Mutex::new(tracker),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.shared.settings
    }

    /// Starts `thread_count` workers; does nothing if already running.
    pub fn start(&self, thread_count: usize) -> Result<()> {
        let mut workers = self.workers.lock();
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        for id in 0..thread_count.max(1) {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("nucmap-render-{}", id))
                .spawn(move || shared.worker_loop(id));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    drop(workers);
                    self.stop();
                    return Err(MapError::Io(e));
                }
            }
        }
        info!("Started {} render workers", thread_count.max(1));
        Ok(())
    }

    /// Stops all workers after their current step and waits for them.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        {
            let _queue = self.shared.queue.lock();
            self.shared.changed.notify_all();
        }
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("A render worker panicked while stopping");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn is_redundant(queue: &Queue, task: &dyn RenderTask) -> bool {
        queue
            .tasks
            .iter()
            .any(|queued| queued.has_more_work() && queued.contains(task))
    }

    /// Removes pending tasks `task` makes redundant and cancels the active
    /// one if `task` covers it.
    fn drop_contained(queue: &mut Queue, task: &dyn RenderTask) {
        let mut index = 0;
        queue.tasks.retain(|queued| {
            let keep = index == 0 || !task.contains(queued.as_ref());
            index += 1;
            keep
        });
        if let Some(active) = queue.tasks.front() {
            if task.contains(active.as_ref()) {
                active.cancel();
            }
        }
    }

    /// Appends a task. Returns `false` if a queued task already covers it.
    pub fn schedule(&self, task: Arc<dyn RenderTask>) -> bool {
        let mut queue = self.shared.queue.lock();
        if Self::is_redundant(&queue, task.as_ref()) {
            return false;
        }
        Self::drop_contained(&mut queue, task.as_ref());
        queue.tasks.push_back(task);
        self.shared.changed.notify_all();
        true
    }

    /// Like [`schedule`](Self::schedule), but the task goes right after the active one.
    pub fn schedule_next(&self, task: Arc<dyn RenderTask>) -> bool {
        let mut queue = self.shared.queue.lock();
        if Self::is_redundant(&queue, task.as_ref()) {
            return false;
        }
        Self::drop_contained(&mut queue, task.as_ref());
        if queue.tasks.len() <= 1 {
            queue.tasks.push_back(task);
        } else {
            queue.tasks.insert(1, task);
        }
        self.shared.changed.notify_all();
        true
    }

    /// Removes a pending task, or cancels it if it is the active one.
    pub fn remove(&self, task: &dyn RenderTask) -> bool {
        let mut queue = self.shared.queue.lock();
        let Some(index) = queue.tasks.iter().position(|t| t.same_task(task)) else {
            return false;
        };
        if index == 0 {
            queue.tasks[0].cancel();
        } else {
            queue.tasks.remove(index);
        }
        self.shared.changed.notify_all();
        true
    }

    /// Cancels the active task and drops all pending ones.
    pub fn remove_all_tasks(&self) {
        let mut queue = self.shared.queue.lock();
        if let Some(active) = queue.tasks.front() {
            active.cancel();
        }
        queue.tasks.truncate(1);
        self.shared.changed.notify_all();
    }

    /// Sorts the pending tasks; the active task keeps its place.
    pub fn reorder<F>(&self, mut compare: F)
    where
        F: FnMut(&Arc<dyn RenderTask>, &Arc<dyn RenderTask>) -> CmpOrdering,
    {
        let mut queue = self.shared.queue.lock();
        if queue.tasks.len() <= 2 {
            return;
        }
        queue.tasks.make_contiguous()[1..].sort_by(|a, b| compare(a, b));
    }

    pub fn current_task(&self) -> Option<Arc<dyn RenderTask>> {
        self.shared.queue.lock().tasks.front().cloned()
    }

    pub fn scheduled_tasks(&self) -> Vec<Arc<dyn RenderTask>> {
        self.shared.queue.lock().tasks.iter().cloned().collect()
    }

    pub fn completed_tasks(&self) -> Vec<CompletedTask> {
        self.shared.completed.lock().iter().cloned().collect()
    }

    pub fn estimate_remaining_time(&self) -> Option<Duration> {
        let task = self.current_task()?;
        let progress = task.estimate_progress();
        self.shared.tracker.lock().estimate_remaining(progress)
    }

    /// Waits until the queue is empty and no worker is busy. Returns
    /// `false` on timeout.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.shared.queue.lock();
        while !queue.tasks.is_empty() || queue.busy > 0 {
            if self
                .shared
                .changed
                .wait_until(&mut queue, deadline)
                .timed_out()
            {
                return queue.tasks.is_empty() && queue.busy == 0;
            }
        }
        true
    }
}

impl Drop for RenderManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::CountingTask;
    use super::*;

    fn settings() -> RenderSettings {
        RenderSettings {
            thread_count: 2,
            completed_history: 3,
            error_cooldown_ms: 1,
            ..RenderSettings::default()
        }
    }

    #[test]
    fn test_schedule_dedup_and_containment() {
        let manager = RenderManager::new(settings());
        let a = CountingTask::new("a", 1);
        let b = CountingTask::new("b", 1);
        assert!(manager.schedule(a.clone()));
        assert!(!manager.schedule(CountingTask::new("a", 1)));
        assert!(manager.schedule(b.clone()));
        let c = CountingTask::new("c", 1);
        assert!(manager.schedule_next(c));
        let names: Vec<String> = manager
            .scheduled_tasks()
            .iter()
            .map(|t| t.description())
            .collect();
        assert_eq!(names, ["a", "c", "b"]);

        manager.reorder(|x, y| x.description().cmp(&y.description()));
        let names: Vec<String> = manager
            .scheduled_tasks()
            .iter()
            .map(|t| t.description())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);

        assert!(manager.remove(b.as_ref()));
        assert_eq!(manager.scheduled_tasks().len(), 2);
        assert!(manager.remove(a.as_ref()));
        assert!(a.is_cancelled());
        assert_eq!(manager.scheduled_tasks().len(), 2);
        assert!(!manager.remove(CountingTask::new("zzz", 1).as_ref()));
    }

    #[test]
    fn test_workers_run_everything() {
        let manager = RenderManager::new(settings());
        let tasks: Vec<_> = (0..5).map(|i| CountingTask::new(&format!("t{}", i), 50)).collect();
        for task in &tasks {
            manager.schedule(task.clone());
        }
        manager.start(3).unwrap();
        assert!(manager.is_running());
        assert!(manager.wait_until_idle(Duration::from_secs(10)));
        for task in &tasks {
            assert_eq!(task.done(), 50);
        }
        let completed = manager.completed_tasks();
        assert_eq!(completed.len(), 3);
        assert_eq!(completed[2].task.description(), "t4");
        manager.stop();
        assert!(!manager.is_running());
    }

    #[test]
    fn test_failing_task_does_not_kill_workers() {
        let manager = RenderManager::new(settings());
        manager.schedule(CountingTask::failing("bad", 3));
        let good = CountingTask::new("good", 10);
        manager.schedule(good.clone());
        manager.start(2).unwrap();
        assert!(manager.wait_until_idle(Duration::from_secs(10)));
        assert_eq!(good.done(), 10);
    }

    #[test]
    fn test_remove_all_and_idle_timeout() {
        let manager = RenderManager::new(settings());
        let a = CountingTask::new("a", 1_000_000);
        manager.schedule(a.clone());
        manager.schedule(CountingTask::new("b", 1));
        assert!(!manager.wait_until_idle(Duration::from_millis(20)));
        manager.remove_all_tasks();
        assert!(a.is_cancelled());
        assert_eq!(manager.scheduled_tasks().len(), 1);
        manager.start(1).unwrap();
        assert!(manager.wait_until_idle(Duration::from_secs(10)));
        assert!(manager.current_task().is_none());
    }
}
