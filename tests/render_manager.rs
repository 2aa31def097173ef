mod common;

use common::{box_mask, flat_region, run_to_end, settings, Status, TestMap};
use nucmap::config::{NucmapConfig, RenderSettings};
use nucmap::hires::{DefaultResourcePack, TileModelPool};
use nucmap::render::{
    ForceStrategy, MapPurgeTask, MapSaveTask, MapUpdateTask, RenderManager, RenderTask,
    WorldRegionRenderTask,
};
use nucmap::state::TileState;
use nucmap::storage::{FileStorage, Storage};
use nucmap::world::{region_filename, DirectoryRegionSource, World};
use nucmap::{RenderMap, Vec2i};
use std::sync::Arc;
use std::time::Duration;

fn quick_settings() -> RenderSettings {
    RenderSettings {
        error_cooldown_ms: 10,
        progress_interval_ms: 10,
        ..RenderSettings::default()
    }
}

fn region(map: &Arc<RenderMap>, x: i32, z: i32) -> Arc<WorldRegionRenderTask> {
    Arc::new(WorldRegionRenderTask::new(
        Arc::clone(map),
        Vec2i::new(x, z),
        ForceStrategy::None,
    ))
}

fn update(map: &Arc<RenderMap>, regions: &[(i32, i32)]) -> Arc<MapUpdateTask> {
    Arc::new(MapUpdateTask::new(
        Arc::clone(map),
        regions.iter().map(|&(x, z)| Vec2i::new(x, z)).collect(),
        ForceStrategy::None,
    ))
}

fn descriptions(manager: &RenderManager) -> Vec<String> {
    manager
        .scheduled_tasks()
        .iter()
        .map(|t| t.description())
        .collect()
}

#[test]
fn test_update_removes_contained_pending_task() {
    let env = TestMap::new();
    let map = env.open(settings("world"));
    let manager = RenderManager::new(quick_settings());

    let active = region(&map, 5, 5);
    let a = region(&map, 0, 0);
    let b = update(&map, &[(0, 0), (1, 0)]);
    assert!(manager.schedule(active.clone()));
    assert!(manager.schedule(a.clone()));
    assert!(manager.schedule(b.clone()));

    let queued = manager.scheduled_tasks();
    assert_eq!(queued.len(), 2);
    assert!(queued[0].same_task(&*active));
    assert!(queued[1].same_task(&*b));
    assert!(active.has_more_work());

    // already covered by the queued update
    assert!(!manager.schedule(region(&map, 1, 0)));
    assert_eq!(manager.scheduled_tasks().len(), 2);
}

#[test]
fn test_update_cancels_contained_active_task() {
    let env = TestMap::new();
    let map = env.open(settings("world"));
    let manager = RenderManager::new(quick_settings());

    let a = region(&map, 0, 0);
    let b = update(&map, &[(0, 0), (1, 0)]);
    manager.schedule(a.clone());
    manager.schedule(b.clone());

    assert!(!a.has_more_work());
    let queued = manager.scheduled_tasks();
    assert_eq!(queued.len(), 2);
    assert!(queued[0].same_task(&*a));
    assert!(queued[1].same_task(&*b));
}

#[test]
fn test_schedule_next_and_remove() {
    let env = TestMap::new();
    let map = env.open(settings("world"));
    let manager = RenderManager::new(quick_settings());

    manager.schedule(region(&map, 0, 0));
    manager.schedule(region(&map, 1, 0));
    manager.schedule(region(&map, 2, 0));
    assert!(manager.schedule_next(region(&map, 9, 9)));
    assert_eq!(
        descriptions(&manager),
        vec![
            "Render region (0, 0) of map 'world'",
            "Render region (9, 9) of map 'world'",
            "Render region (1, 0) of map 'world'",
            "Render region (2, 0) of map 'world'",
        ]
    );

    manager.reorder(|a, b| b.description().cmp(&a.description()));
    assert_eq!(descriptions(&manager)[1], "Render region (9, 9) of map 'world'");
    assert_eq!(descriptions(&manager)[3], "Render region (1, 0) of map 'world'");

    assert!(manager.remove(&*region(&map, 2, 0)));
    assert!(!manager.remove(&*region(&map, 7, 7)));
    assert_eq!(manager.scheduled_tasks().len(), 3);

    let active = manager.current_task().unwrap();
    manager.remove_all_tasks();
    assert_eq!(manager.scheduled_tasks().len(), 1);
    assert!(!active.has_more_work());
}

#[test]
fn test_workers_render_a_map_and_save_it() {
    let env = TestMap::new();
    env.source.insert(Vec2i::new(0, 0), flat_region(|_| Status::Full, 1000));
    env.source.insert(Vec2i::new(1, 0), flat_region(|_| Status::Full, 1000));
    let mut s = settings("world");
    s.mask = box_mask(575, 63);
    let map = env.open(s);

    let manager = RenderManager::new(quick_settings());
    let task = Arc::new(MapUpdateTask::for_world(Arc::clone(&map), ForceStrategy::None, None).unwrap());
    assert_eq!(task.regions(), &[Vec2i::new(0, 0), Vec2i::new(1, 0)]);
    manager.schedule(task.clone());
    manager.schedule(Arc::new(MapSaveTask::new(Arc::clone(&map))));
    manager.start(4).unwrap();
    assert!(manager.wait_until_idle(Duration::from_secs(120)));
    manager.stop();
    assert!(!manager.is_running());

    assert_eq!(task.estimate_progress(), 1.0);
    for tx in 0..18 {
        for tz in 0..2 {
            let tile = Vec2i::new(tx, tz);
            assert_eq!(map.tile_state().get(tile).state, TileState::Rendered, "tile {}", tile);
        }
    }
    assert_eq!(map.tile_state().get(Vec2i::new(18, 0)).state, TileState::Unknown);
    assert!(map.last_saved().unwrap().is_some());

    let completed = manager.completed_tasks();
    assert_eq!(completed.len(), 2);
    assert!(completed[0].task.same_task(&*task));
}

#[test]
fn test_failing_task_does_not_stop_the_workers() {
    let env = TestMap::new();
    // not a region file
    env.source.insert(Vec2i::new(0, 0), vec![1u8, 2, 3]);
    env.source.insert(Vec2i::new(1, 0), flat_region(|_| Status::Full, 1000));
    let mut s = settings("world");
    s.mask = box_mask(1023, 31);
    let map = env.open(s);

    let manager = RenderManager::new(quick_settings());
    let broken = region(&map, 0, 0);
    let good = region(&map, 1, 0);
    manager.schedule(broken.clone());
    manager.schedule(good.clone());
    manager.start(2).unwrap();
    assert!(manager.wait_until_idle(Duration::from_secs(60)));

    assert!(broken.is_completed());
    assert!(good.is_completed());
    assert_eq!(good.stats().rendered, 16);
    assert_eq!(map.tile_state().get(Vec2i::new(0, 0)).state, TileState::Unknown);
}

#[test]
fn test_purge_task_clears_everything() {
    let env = TestMap::new();
    env.source.insert(Vec2i::new(0, 0), flat_region(|_| Status::Full, 1000));
    let mut s = settings("world");
    s.mask = box_mask(63, 31);
    let map = env.open(s);
    run_to_end(&*region(&map, 0, 0));
    run_to_end(&MapSaveTask::new(Arc::clone(&map)));
    assert!(map.hires().tile_exists(Vec2i::new(0, 0)).unwrap());
    assert_ne!(map.chunk_state().get(Vec2i::new(0, 0)), 0);

    let purge = MapPurgeTask::new(Arc::clone(&map));
    assert!(purge.has_more_work());
    run_to_end(&purge);
    assert!(!purge.has_more_work());
    assert_eq!(purge.estimate_progress(), 1.0);

    assert!(!map.hires().tile_exists(Vec2i::new(0, 0)).unwrap());
    assert_eq!(map.tile_state().get(Vec2i::new(0, 0)).state, TileState::Unknown);
    assert_eq!(map.chunk_state().get(Vec2i::new(0, 0)), 0);
    assert!(map.last_saved().unwrap().is_none());
    assert!(env.storage.list_grid("world", "hires", 0, 100).unwrap().is_empty());

    // everything renders again after a purge
    let again = region(&map, 0, 0);
    run_to_end(&*again);
    assert_eq!(again.stats().rendered, 2);
}

#[test]
fn test_cancelled_purge_does_nothing() {
    let env = TestMap::new();
    let map = env.open(settings("world"));
    map.save().unwrap();
    let purge = MapPurgeTask::new(Arc::clone(&map));
    purge.cancel();
    assert!(!purge.has_more_work());
    purge.do_work().unwrap();
    assert!(map.last_saved().unwrap().is_some());
}

#[test]
fn test_render_world_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let world_dir = dir.path().join("world");
    let region_dir = world_dir.join("region");
    std::fs::create_dir_all(&region_dir).unwrap();
    std::fs::write(
        region_dir.join(region_filename(Vec2i::new(0, 0))),
        flat_region(|_| Status::Full, 1000),
    )
    .unwrap();
    // not a region file name, ignored
    std::fs::write(region_dir.join("notes.txt"), b"hello").unwrap();

    let json = format!(
        r#"{{
            "storage_root": {:?},
            "compression": "gzip",
            "render": {{ "thread_count": 2 }},
            "maps": [{{
                "id": "overworld",
                "world": {:?},
                "render_top_only": true,
                "mask": [{{ "type": "box", "min": [0, -64, 0], "max": [63, 319, 63] }}]
            }}]
        }}"#,
        dir.path().join("web").to_string_lossy(),
        world_dir.to_string_lossy()
    );
    let config = NucmapConfig::from_json_str(&json).unwrap();
    let settings = config.map("overworld").unwrap().clone();
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(&config.storage_root, config.compression));
    let world = Arc::new(World::new(
        Arc::new(DirectoryRegionSource::for_world(&settings.world)),
        settings.dimension.clone(),
    ));
    let map = Arc::new(
        RenderMap::new(
            settings.clone(),
            world,
            Arc::clone(&storage),
            Arc::new(DefaultResourcePack::new()),
            Arc::new(TileModelPool::new(64, config.render.max_faces, Duration::from_secs(60))),
        )
        .unwrap(),
    );

    let manager = RenderManager::new(config.render.clone());
    manager.schedule(Arc::new(
        MapUpdateTask::for_world(Arc::clone(&map), ForceStrategy::None, Some((Vec2i::new(0, 0), 10)))
            .unwrap(),
    ));
    manager.schedule(Arc::new(MapSaveTask::new(Arc::clone(&map))));
    manager.start(config.render.thread_count).unwrap();
    assert!(manager.wait_until_idle(Duration::from_secs(60)));
    manager.stop();

    assert_eq!(storage.list_maps().unwrap(), vec!["overworld".to_string()]);
    let tiles = storage.list_grid("overworld", "hires", 0, 100).unwrap();
    assert_eq!(tiles.len(), 4);
    assert!(map.last_saved().unwrap().is_some());
}

#[test]
fn test_long_render_releases_regions_and_metadata() {
    let env = TestMap::new();
    for x in 0..3 {
        env.source.insert(Vec2i::new(x, 0), flat_region(|_| Status::Full, 1000));
    }
    let mut s = settings("world");
    s.mask = box_mask(1535, 63);
    let map = env.open(s);

    let manager = RenderManager::new(quick_settings());
    let task = Arc::new(MapUpdateTask::for_world(Arc::clone(&map), ForceStrategy::None, None).unwrap());
    assert_eq!(task.regions().len(), 3);
    manager.schedule(task.clone());
    manager.schedule(Arc::new(MapSaveTask::new(Arc::clone(&map))));
    manager.start(4).unwrap();
    assert!(manager.wait_until_idle(Duration::from_secs(120)));
    manager.stop();

    assert_eq!(map.tile_state().get(Vec2i::new(47, 1)).state, TileState::Rendered);
    assert_eq!(map.pending_meta_count(), 0);
    assert_eq!(
        env.storage
            .list_grid("world", RenderMap::TILE_META_GRID, 0, 1000)
            .unwrap()
            .len(),
        48 * 2
    );
    let meta = map.tile_meta(Vec2i::new(40, 0)).unwrap().unwrap();
    assert_eq!(meta.height(1290, 10), 5);

    let world = map.world();
    assert!(!world.is_region_cached(Vec2i::new(2, 0)));
    assert!(world.cached_regions() <= World::DEFAULT_REGION_CACHE);
    assert!(world.cached_chunks() < 1024);
}
